pub mod db;
mod files;
pub mod models;
mod subjects;
mod tables;

pub use db::{Database, DatabaseError};
pub use files::FileInsert;
pub use subjects::{SubjectDeletion, SubjectInsert, DEFAULT_SUBJECTS};
pub use tables::*;
