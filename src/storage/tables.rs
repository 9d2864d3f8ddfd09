use redb::TableDefinition;

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Ownership index: user_id -> msgpack Vec of file UUIDs
pub const USER_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("user_files");

/// Subject records: uuid -> SubjectRecord (msgpack)
pub const SUBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("subjects");

/// Ownership index: user_id -> msgpack Vec of subject UUIDs
pub const USER_SUBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("user_subjects");

/// Per-user code uniqueness: "{user_id}/{code}" -> subject uuid
pub const SUBJECT_CODES: TableDefinition<&str, &str> = TableDefinition::new("subject_codes");

pub(crate) fn subject_code_key(user_id: &str, code: &str) -> String {
    format!("{user_id}/{code}")
}
