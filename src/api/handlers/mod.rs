mod files;
mod internal;
mod subjects;

pub use files::{delete_file, download_file, get_file, list_files, upload_file};
pub use internal::{health, issue_session};
pub use subjects::{create_subject, delete_subject, list_subjects};
