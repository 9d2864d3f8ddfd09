use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::StoredKey;

/// Classification of a file derived from its MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Audio,
    Binary,
    Document,
    Image,
    Video,
}

impl FileType {
    /// Derive a file type classification from a MIME type string.
    pub fn from_mime(mime_type: &str) -> Self {
        let (primary, sub) = mime_type.split_once('/').unwrap_or((mime_type, ""));
        match primary {
            "audio" => FileType::Audio,
            "image" => FileType::Image,
            "video" => FileType::Video,
            "text" => FileType::Document,
            "application" => match sub {
                "pdf"
                | "msword"
                | "rtf"
                | "vnd.oasis.opendocument.text"
                | "vnd.openxmlformats-officedocument.wordprocessingml.document"
                | "vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                | "vnd.openxmlformats-officedocument.presentationml.presentation"
                | "vnd.ms-excel"
                | "vnd.ms-powerpoint" => FileType::Document,
                _ => FileType::Binary,
            },
            _ => FileType::Binary,
        }
    }
}

/// An encrypted file owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub user_id: String,
    pub original_name: String,
    /// Randomized object name, `{hex id}.{ext}`.
    pub stored_name: String,
    /// Plaintext size in bytes.
    pub byte_size: u64,
    pub mime_type: String,
    pub file_type: FileType,
    pub encryption_key: StoredKey,
    /// Object store key, `{user_id}/{stored_name}`.
    pub storage_path: String,
    /// Code of the subject this file is filed under.
    #[serde(default)]
    pub folder: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user-defined folder grouping files by course code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub code: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}
