//! Shared test helpers for handler tests.

use std::sync::Arc;

use crate::auth::{CurrentUser, SessionManager};
use crate::config::{Config, ServerConfig, SessionConfig, StorageConfig};
use crate::crypto::EncryptionKey;
use crate::object_store::LocalStore;
use crate::storage::Database;
use crate::AppState;

const TEST_SESSION_SECRET: &str = "unicloud-test-session-secret-0123456789";
const TEST_UPLOAD_LIMIT: u64 = 10 * 1024 * 1024; // 10MB

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    build_state(temp_dir, None, TEST_UPLOAD_LIMIT)
}

/// Like [`test_state`], but per-file keys are sealed under a random master key.
pub fn test_state_with_master_key(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let master_key = EncryptionKey::generate().expect("Failed to generate master key");
    build_state(temp_dir, Some(master_key), TEST_UPLOAD_LIMIT)
}

/// Like [`test_state`], with a custom `max_upload_size`.
pub fn test_state_with_upload_limit(
    temp_dir: &tempfile::TempDir,
    max_upload_size: u64,
) -> Arc<AppState> {
    build_state(temp_dir, None, max_upload_size)
}

pub fn test_user(id: &str) -> CurrentUser {
    CurrentUser { id: id.to_string() }
}

fn build_state(
    temp_dir: &tempfile::TempDir,
    master_key: Option<EncryptionKey>,
    max_upload_size: u64,
) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        session: SessionConfig {
            secret: TEST_SESSION_SECRET.to_string(),
            ..Default::default()
        },
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
            ..Default::default()
        },
        master_key,
        test_mode: true,
        max_upload_size,
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let object_store = LocalStore::new(&files_dir).expect("Failed to create test object store");
    let sessions = SessionManager::new(
        config.session.secret.as_bytes(),
        config.session.ttl_seconds,
    );

    Arc::new(AppState {
        config,
        db,
        object_store: Arc::new(object_store),
        sessions,
    })
}
