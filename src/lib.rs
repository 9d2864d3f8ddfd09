//! unicloud - Encrypted per-student file storage organized by course subjects
//!
//! This crate provides:
//! - Per-file AES-256-GCM encryption with optional master-key sealing of file keys
//! - Swappable object storage backends (local filesystem, Supabase Storage)
//! - redb embedded database for file and subject metadata
//! - Signed session tokens and a JSON REST API with multipart upload support

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod object_store;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use auth::SessionManager;
use config::Config;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub object_store: Arc<dyn object_store::ObjectStore>,
    pub sessions: SessionManager,
}
