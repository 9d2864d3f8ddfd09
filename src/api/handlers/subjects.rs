use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth::CurrentUser;
use crate::storage::models::SubjectRecord;
use crate::storage::{SubjectDeletion, SubjectInsert};
use crate::AppState;

const DEFAULT_COLOR: &str = "bg-blue-500";
const MAX_CODE_LEN: usize = 32;
const MAX_NAME_LEN: usize = 120;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SubjectResponse {
    pub code: String,
    pub color: String,
    pub created_at: String,
    pub file_count: u64,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubjectRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub name: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// List the user's subjects, creating the default set on first use.
pub async fn list_subjects(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<JSend<Vec<SubjectResponse>>>, ApiError> {
    let subjects = state.db.ensure_default_subjects(&user.id)?;
    let counts = state.db.folder_counts(&user.id)?;

    let items: Vec<SubjectResponse> = subjects
        .iter()
        .map(|s| subject_to_response(s, counts.get(&s.code).copied().unwrap_or(0)))
        .collect();

    Ok(JSend::success(items))
}

pub async fn create_subject(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppJson(req): AppJson<CreateSubjectRequest>,
) -> Result<Json<JSend<SubjectResponse>>, ApiError> {
    let name = req.name.trim();
    let code = req.code.trim();

    if name.is_empty() || code.is_empty() {
        return Err(ApiError::bad_request("Name and code are required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if code.len() > MAX_CODE_LEN || code.contains('/') {
        return Err(ApiError::bad_request(format!(
            "code must be at most {MAX_CODE_LEN} characters and must not contain '/'"
        )));
    }

    let color = req
        .color
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_COLOR);

    let subject = SubjectRecord {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        name: name.to_string(),
        code: code.to_string(),
        color: color.to_string(),
        created_at: Utc::now(),
    };

    match state.db.create_subject(&subject)? {
        SubjectInsert::Inserted => {}
        SubjectInsert::DuplicateCode => {
            return Err(ApiError::bad_request("Subject code already exists"));
        }
    }

    tracing::debug!(subject_id = %subject.id, code = %subject.code, "Created subject");
    Ok(JSend::success(subject_to_response(&subject, 0)))
}

pub async fn delete_subject(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    match state.db.delete_subject(&user.id, &id)? {
        SubjectDeletion::Deleted => {
            tracing::debug!(subject_id = %id, "Deleted subject");
            Ok(JSend::success(()))
        }
        SubjectDeletion::NotFound => Err(ApiError::not_found("Subject not found")),
        SubjectDeletion::InUse(count) => {
            tracing::debug!(subject_id = %id, count, "Refused to delete subject with files");
            Err(ApiError::bad_request(
                "Cannot delete subject that contains files. Please delete or move files first.",
            ))
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn subject_to_response(subject: &SubjectRecord, file_count: u64) -> SubjectResponse {
    SubjectResponse {
        code: subject.code.clone(),
        color: subject.color.clone(),
        created_at: subject.created_at.to_rfc3339(),
        file_count,
        id: subject.id.clone(),
        name: subject.name.clone(),
    }
}
