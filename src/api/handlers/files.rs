use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, JSend, JSendPaginated, Pagination};
use crate::auth::CurrentUser;
use crate::crypto::{self, StoredKey};
use crate::object_store::ObjectStoreError;
use crate::storage::models::{FileRecord, FileType};
use crate::storage::FileInsert;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub byte_size: u64,
    pub created_at: String,
    pub file_type: FileType,
    pub folder: Option<String>,
    pub id: String,
    pub mime_type: String,
    pub original_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub folder: Option<String>,
}

fn default_limit() -> u32 {
    20
}

/// An uploaded file as read from the multipart body, before encryption.
#[derive(Debug)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
    pub folder: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let mut file: Option<(Option<String>, Option<String>, Bytes)> = None;
    let mut folder: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Invalid multipart data", e))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().map(|s| s.to_string());
                let content_type = field.content_type().map(|s| s.to_string());

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read file", e))?;

                if data.len() as u64 > state.config.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.max_upload_size
                    )));
                }

                file = Some((file_name, content_type, data));
            }
            "folder" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("Invalid folder", e))?;
                folder = Some(text.trim().to_string()).filter(|f| !f.is_empty());
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let incoming = IncomingFile {
        original_name: display_name(file_name.as_deref()),
        content_type,
        data,
        folder,
    };

    let record = store_file(&state, &user, incoming).await?;
    Ok(JSend::success(file_to_response(&record)))
}

/// Encrypt an upload, write the ciphertext to object storage, then record its metadata.
///
/// If the metadata insert fails or is rejected, the uploaded blob is removed again.
pub async fn store_file(
    state: &AppState,
    user: &CurrentUser,
    incoming: IncomingFile,
) -> Result<FileRecord, ApiError> {
    // Determine MIME type: from multipart Content-Type, or guess from filename, or fallback
    let mime_type = incoming
        .content_type
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
        .or_else(|| {
            mime_guess::from_path(&incoming.original_name)
                .first()
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let byte_size = incoming.data.len() as u64;
    let plaintext = incoming.data;
    let (ciphertext, key) = tokio::task::spawn_blocking(move || crypto::encrypt(&plaintext))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Encryption task failed");
            ApiError::internal()
        })??;

    let encryption_key = StoredKey::seal(&key, state.config.master_key.as_ref())?;
    let stored_name = crypto::random_file_name(&incoming.original_name)?;
    let storage_path = format!("{}/{}", user.id, stored_name);

    // Phase 1: Upload ciphertext to object storage
    state
        .object_store
        .put(&storage_path, Bytes::from(ciphertext))
        .await?;

    // Phase 2: Record metadata
    let now = Utc::now();
    let record = FileRecord {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        original_name: incoming.original_name,
        stored_name,
        byte_size,
        file_type: FileType::from_mime(&mime_type),
        mime_type,
        encryption_key,
        storage_path,
        folder: incoming.folder,
        created_at: now,
        updated_at: now,
    };

    match state.db.insert_file(&record) {
        Ok(FileInsert::Inserted) => {}
        Ok(FileInsert::UnknownFolder) => {
            discard_blob(state, &record.storage_path).await;
            return Err(ApiError::bad_request(format!(
                "Subject '{}' does not exist",
                record.folder.as_deref().unwrap_or_default()
            )));
        }
        Err(e) => {
            discard_blob(state, &record.storage_path).await;
            return Err(e.into());
        }
    }

    tracing::debug!(file_id = %record.id, user_id = %user.id, byte_size, "Stored encrypted file");
    Ok(record)
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state
        .db
        .get_file(&user.id, &id)?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    Ok(JSend::success(file_to_response(&file)))
}

/// Serve decrypted file content as an attachment.
/// Route: GET /api/files/:id/download
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let file = state
        .db
        .get_file(&user.id, &id)?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    let ciphertext = state
        .object_store
        .get(&file.storage_path)
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) => {
                tracing::warn!(file_id = %file.id, "File content missing from object storage");
                ApiError::not_found("File content not found")
            }
            other => other.into(),
        })?;

    let key = file.encryption_key.open(state.config.master_key.as_ref())?;
    let plaintext = tokio::task::spawn_blocking(move || crypto::decrypt(&ciphertext, &key))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Decryption task failed");
            ApiError::internal()
        })??;

    let content_length = plaintext.len() as u64;
    let mut response = (StatusCode::OK, plaintext).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.mime_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    if let Ok(value) = content_disposition(&file.original_name).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, no-store"),
    );

    tracing::debug!(file_id = %file.id, "Served decrypted file");
    Ok(response)
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    // Phase 1: Remove metadata
    let file = state
        .db
        .delete_file(&user.id, &id)?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    // Phase 2: Delete blob from object storage (best-effort)
    discard_blob(&state, &file.storage_path).await;

    tracing::debug!(file_id = %id, "Deleted file");
    Ok(JSend::success(()))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let files = state.db.list_files(&user.id, params.folder.as_deref())?;
    let total = files.len() as u64;
    let items: Vec<FileResponse> = files
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(file_to_response)
        .collect();

    Ok(JSendPaginated::success(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

// ============================================================================
// Helpers
// ============================================================================

fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        byte_size: file.byte_size,
        created_at: file.created_at.to_rfc3339(),
        file_type: file.file_type,
        folder: file.folder.clone(),
        id: file.id.clone(),
        mime_type: file.mime_type.clone(),
        original_name: file.original_name.clone(),
    }
}

/// Keeps the status axum assigns, so a body over the route limit answers 413.
fn multipart_error(context: &str, e: MultipartError) -> ApiError {
    ApiError::Fail(e.status(), format!("{context}: {}", e.body_text()))
}

async fn discard_blob(state: &AppState, storage_path: &str) {
    if let Err(e) = state.object_store.delete(storage_path).await {
        tracing::warn!(storage_path, error = %e, "Failed to delete blob from object storage");
    }
}

/// Last path component of a client-supplied file name.
fn display_name(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("untitled")
        .to_string()
}

/// `attachment` disposition with an ASCII fallback name plus the UTF-8 name (RFC 6266).
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(file_name.len());
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
