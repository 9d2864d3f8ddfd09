use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth::{SessionError, SessionManager};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueSessionRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Test mode only: sign in as `user_id` without going through the OAuth provider.
pub async fn issue_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<IssueSessionRequest>,
) -> Result<(CookieJar, Json<JSend<SessionResponse>>), ApiError> {
    let token = state.sessions.issue(&req.user_id).map_err(|e| match e {
        SessionError::InvalidSubject => ApiError::bad_request(
            "user_id must be 1-128 characters of letters, digits, '-', '_', '.' or '@'",
        ),
        SessionError::Token(e) => {
            tracing::error!(error = %e, "Failed to sign session token");
            ApiError::internal()
        }
    })?;

    tracing::warn!(user_id = %req.user_id, "Issued test-mode session");

    let jar = jar.add(SessionManager::cookie(token.clone()));
    Ok((
        jar,
        JSend::success(SessionResponse {
            token,
            user_id: req.user_id,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SESSION_COOKIE;
    use crate::testutil::test_state;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_issue_session_sets_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (jar, Json(body)) = issue_session(
            State(state.clone()),
            CookieJar::new(),
            AppJson(IssueSessionRequest {
                user_id: "octocat".to_string(),
            }),
        )
        .await
        .unwrap();

        let cookie = jar.get(SESSION_COOKIE).expect("session cookie is set");
        assert_eq!(cookie.value(), body.data.token);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(state.sessions.verify(&body.data.token).unwrap().user_id, "octocat");
    }

    #[tokio::test]
    async fn test_issue_session_rejects_bad_user_id() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let err = issue_session(
            State(state),
            CookieJar::new(),
            AppJson(IssueSessionRequest {
                user_id: "../../root".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
