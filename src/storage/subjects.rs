use chrono::{Duration, Utc};
use redb::ReadableTable;

use super::db::{index_add, index_remove, read_index, Database, DatabaseError};
use super::models::{FileRecord, SubjectRecord};
use super::tables::*;

/// Subjects created for a user who has none: `(name, code, color)`.
pub const DEFAULT_SUBJECTS: [(&str, &str, &str); 6] = [
    ("Data Structures & Algorithms", "CS301", "bg-blue-500"),
    ("Database Management", "CS302", "bg-green-500"),
    ("Web Development", "CS303", "bg-purple-500"),
    ("Software Engineering", "CS304", "bg-orange-500"),
    ("Computer Networks", "CS305", "bg-red-500"),
    ("Operating Systems", "CS306", "bg-indigo-500"),
];

/// Outcome of creating a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectInsert {
    Inserted,
    /// The owner already has a subject with this code. Nothing was written.
    DuplicateCode,
}

/// Outcome of deleting a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectDeletion {
    Deleted,
    NotFound,
    /// Files still reference the subject's code; it was left in place.
    InUse(u64),
}

impl Database {
    // ========================================================================
    // Subject operations
    // ========================================================================

    /// Create a subject, enforcing per-user code uniqueness.
    pub fn create_subject(&self, subject: &SubjectRecord) -> Result<SubjectInsert, DatabaseError> {
        debug_assert!(!subject.id.is_empty(), "subject id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut codes = write_txn.open_table(SUBJECT_CODES)?;
            let code_key = subject_code_key(&subject.user_id, &subject.code);
            if codes.get(code_key.as_str())?.is_some() {
                drop(codes);
                write_txn.abort()?;
                return Ok(SubjectInsert::DuplicateCode);
            }
            codes.insert(code_key.as_str(), subject.id.as_str())?;

            let mut table = write_txn.open_table(SUBJECTS)?;
            let data = rmp_serde::to_vec_named(subject)?;
            table.insert(subject.id.as_str(), data.as_slice())?;

            let mut owner_index = write_txn.open_table(USER_SUBJECTS)?;
            index_add(&mut owner_index, &subject.user_id, &subject.id)?;
        }
        write_txn.commit()?;
        Ok(SubjectInsert::Inserted)
    }

    /// Seed [`DEFAULT_SUBJECTS`] for a user with no subjects, returning the user's subjects.
    ///
    /// Runs in one write transaction, so concurrent first requests seed only once.
    pub fn ensure_default_subjects(
        &self,
        user_id: &str,
    ) -> Result<Vec<SubjectRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let seeded = {
            let mut owner_index = write_txn.open_table(USER_SUBJECTS)?;
            if !read_index(&owner_index, user_id)?.is_empty() {
                None
            } else {
                let mut table = write_txn.open_table(SUBJECTS)?;
                let mut codes = write_txn.open_table(SUBJECT_CODES)?;

                // Stagger timestamps so the defaults keep their order when sorted.
                let now = Utc::now();
                let mut seeded = Vec::with_capacity(DEFAULT_SUBJECTS.len());
                for (offset, (name, code, color)) in DEFAULT_SUBJECTS.iter().enumerate() {
                    let subject = SubjectRecord {
                        id: uuid::Uuid::new_v4().to_string(),
                        user_id: user_id.to_string(),
                        name: name.to_string(),
                        code: code.to_string(),
                        color: color.to_string(),
                        created_at: now + Duration::milliseconds(offset as i64),
                    };

                    let data = rmp_serde::to_vec_named(&subject)?;
                    table.insert(subject.id.as_str(), data.as_slice())?;
                    codes.insert(
                        subject_code_key(user_id, &subject.code).as_str(),
                        subject.id.as_str(),
                    )?;
                    index_add(&mut owner_index, user_id, &subject.id)?;
                    seeded.push(subject);
                }
                Some(seeded)
            }
        };

        match seeded {
            Some(seeded) => {
                write_txn.commit()?;
                tracing::debug!(user_id, count = seeded.len(), "Seeded default subjects");
                Ok(seeded)
            }
            None => {
                write_txn.abort()?;
                self.list_subjects(user_id)
            }
        }
    }

    /// All subjects owned by `user_id`, oldest first.
    pub fn list_subjects(&self, user_id: &str) -> Result<Vec<SubjectRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_index = read_txn.open_table(USER_SUBJECTS)?;
        let table = read_txn.open_table(SUBJECTS)?;

        let mut subjects = Vec::new();
        for subject_id in read_index(&owner_index, user_id)? {
            if let Some(data) = table.get(subject_id.as_str())? {
                let subject: SubjectRecord = rmp_serde::from_slice(data.value())?;
                subjects.push(subject);
            }
        }

        subjects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(subjects)
    }

    /// Get a subject by id, visible only to its owner.
    pub fn get_subject(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<SubjectRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SUBJECTS)?;

        let subject = match table.get(id)? {
            Some(data) => rmp_serde::from_slice::<SubjectRecord>(data.value())?,
            None => return Ok(None),
        };

        Ok((subject.user_id == user_id).then_some(subject))
    }

    /// Delete one of `user_id`'s subjects unless files are still filed under its code.
    ///
    /// The reference check and the delete share one write transaction.
    pub fn delete_subject(&self, user_id: &str, id: &str) -> Result<SubjectDeletion, DatabaseError> {
        let write_txn = self.begin_write()?;

        let outcome = {
            let mut table = write_txn.open_table(SUBJECTS)?;
            let subject = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<SubjectRecord>(data.value())?),
                None => None,
            };

            match subject {
                Some(subject) if subject.user_id == user_id => {
                    let referencing = {
                        let owner_files = write_txn.open_table(USER_FILES)?;
                        let files = write_txn.open_table(FILES)?;
                        let mut count = 0u64;
                        for file_id in read_index(&owner_files, user_id)? {
                            if let Some(data) = files.get(file_id.as_str())? {
                                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                                if file.folder.as_deref() == Some(subject.code.as_str()) {
                                    count += 1;
                                }
                            }
                        }
                        count
                    };

                    if referencing > 0 {
                        SubjectDeletion::InUse(referencing)
                    } else {
                        table.remove(id)?;
                        let mut codes = write_txn.open_table(SUBJECT_CODES)?;
                        codes.remove(subject_code_key(user_id, &subject.code).as_str())?;
                        let mut owner_index = write_txn.open_table(USER_SUBJECTS)?;
                        index_remove(&mut owner_index, user_id, id)?;
                        SubjectDeletion::Deleted
                    }
                }
                _ => SubjectDeletion::NotFound,
            }
        };

        if outcome == SubjectDeletion::Deleted {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(outcome)
    }
}
