use std::collections::HashMap;

use redb::ReadableTable;

use super::db::{index_add, index_remove, read_index, Database, DatabaseError};
use super::models::FileRecord;
use super::tables::*;

/// Outcome of inserting a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileInsert {
    Inserted,
    /// The record's folder does not name a subject of its owner. Nothing was written.
    UnknownFolder,
}

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Store a new file record and add it to its owner's index.
    ///
    /// The folder check and the insert share one write transaction, so a subject
    /// cannot disappear between the check and the write.
    pub fn insert_file(&self, file: &FileRecord) -> Result<FileInsert, DatabaseError> {
        debug_assert!(!file.id.is_empty(), "file id must not be empty");
        debug_assert!(!file.user_id.is_empty(), "file owner must not be empty");

        let write_txn = self.begin_write()?;
        {
            if let Some(ref code) = file.folder {
                let codes = write_txn.open_table(SUBJECT_CODES)?;
                if codes
                    .get(subject_code_key(&file.user_id, code).as_str())?
                    .is_none()
                {
                    drop(codes);
                    write_txn.abort()?;
                    return Ok(FileInsert::UnknownFolder);
                }
            }

            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(file)?;
            table.insert(file.id.as_str(), data.as_slice())?;

            let mut owner_index = write_txn.open_table(USER_FILES)?;
            index_add(&mut owner_index, &file.user_id, &file.id)?;
        }
        write_txn.commit()?;
        Ok(FileInsert::Inserted)
    }

    /// Get a file by id, visible only to its owner.
    pub fn get_file(&self, user_id: &str, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let file = match table.get(id)? {
            Some(data) => rmp_serde::from_slice::<FileRecord>(data.value())?,
            None => return Ok(None),
        };

        Ok((file.user_id == user_id).then_some(file))
    }

    /// All files owned by `user_id`, newest first, optionally restricted to one folder.
    pub fn list_files(
        &self,
        user_id: &str,
        folder: Option<&str>,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_index = read_txn.open_table(USER_FILES)?;
        let files_table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for file_id in read_index(&owner_index, user_id)? {
            if let Some(data) = files_table.get(file_id.as_str())? {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                if folder.is_none() || file.folder.as_deref() == folder {
                    files.push(file);
                }
            }
        }

        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files)
    }

    /// Delete one of `user_id`'s files, returning the removed record.
    pub fn delete_file(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let removed = {
            let mut table = write_txn.open_table(FILES)?;
            let existing = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                None => None,
            };

            match existing {
                Some(file) if file.user_id == user_id => {
                    table.remove(id)?;
                    let mut owner_index = write_txn.open_table(USER_FILES)?;
                    index_remove(&mut owner_index, user_id, id)?;
                    Some(file)
                }
                _ => None,
            }
        };

        write_txn.commit()?;
        Ok(removed)
    }

    /// File counts per folder code for one user. Unfiled files are not counted.
    pub fn folder_counts(&self, user_id: &str) -> Result<HashMap<String, u64>, DatabaseError> {
        let mut counts = HashMap::new();
        for file in self.list_files(user_id, None)? {
            if let Some(code) = file.folder {
                *counts.entry(code).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
