use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = usize::try_from(state.config.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        // Files
        .route("/api/files", get(handlers::list_files))
        .route(
            "/api/files/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/files/:id",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/api/files/:id/download", get(handlers::download_file))
        // Subjects
        .route(
            "/api/subjects",
            get(handlers::list_subjects).post(handlers::create_subject),
        )
        .route("/api/subjects/:id", delete(handlers::delete_subject))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled: session issuance route is available.");
        router = router.route("/_internal/sessions", post(handlers::issue_session));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::response::{JSendFail, JSendStatus};
    use crate::testutil::{test_state, test_state_with_upload_limit};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    const BOUNDARY: &str = "unicloud-test-boundary";

    fn multipart_body(file_len: usize) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"notes.bin\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.resize(body.len() + file_len, b'x');
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(token: Option<&str>, file_len: usize) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/files/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(multipart_body(file_len))).unwrap()
    }

    async fn fail_body(response: Response) -> JSendFail {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn blob_count(dir: &tempfile::TempDir, user_id: &str) -> usize {
        std::fs::read_dir(dir.path().join("files").join(user_id))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_api_routes_require_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let routes = [
            (Method::GET, "/api/files"),
            (Method::GET, "/api/files/some-id"),
            (Method::DELETE, "/api/files/some-id"),
            (Method::GET, "/api/files/some-id/download"),
            (Method::GET, "/api/subjects"),
            (Method::POST, "/api/subjects"),
            (Method::DELETE, "/api/subjects/some-id"),
        ];

        for auth in [None, Some("Bearer forged.token.value")] {
            for (method, uri) in &routes {
                let mut builder = Request::builder()
                    .method(method.clone())
                    .uri(*uri)
                    .header(header::CONTENT_TYPE, "application/json");
                if let Some(value) = auth {
                    builder = builder.header(header::AUTHORIZATION, value);
                }
                let request = builder
                    .body(Body::from(r#"{"name":"Compilers","code":"CS401"}"#))
                    .unwrap();

                let response = app.clone().oneshot(request).await.unwrap();
                assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
                let body = fail_body(response).await;
                assert_eq!(body.status, JSendStatus::Fail);
                assert_eq!(body.data.message, "Unauthorized");
            }
        }

        let response = app.clone().oneshot(upload_request(None, 16)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(fail_body(response).await.status, JSendStatus::Fail);

        let response = app
            .oneshot(upload_request(Some("forged"), 16))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_oversize_uploads_are_rejected_with_413() {
        const LIMIT: u64 = 64 * 1024;

        let dir = tempfile::tempdir().unwrap();
        let state = test_state_with_upload_limit(&dir, LIMIT);
        let token = state.sessions.issue("uploader").unwrap();
        let app = create_router(state);

        let within = app
            .clone()
            .oneshot(upload_request(Some(&token), LIMIT as usize))
            .await
            .unwrap();
        assert_eq!(within.status(), StatusCode::OK);
        assert_eq!(blob_count(&dir, "uploader"), 1);

        // Just over the file limit, and far past the route's body limit.
        for file_len in [LIMIT as usize + 1, LIMIT as usize + 1024 * 1024] {
            let response = app
                .clone()
                .oneshot(upload_request(Some(&token), file_len))
                .await
                .unwrap();
            assert_eq!(
                response.status(),
                StatusCode::PAYLOAD_TOO_LARGE,
                "file of {file_len} bytes"
            );
            assert_eq!(fail_body(response).await.status, JSendStatus::Fail);
        }
        assert_eq!(blob_count(&dir, "uploader"), 1);
    }

    #[tokio::test]
    async fn test_huge_upload_limit_does_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state_with_upload_limit(&dir, u64::MAX);
        let token = state.sessions.issue("uploader").unwrap();
        let app = create_router(state);

        let response = app.oneshot(upload_request(Some(&token), 32)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_issued_session_cookie_authenticates() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/_internal/sessions")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"user_id":"student-7"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie is set")
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("unicloud_session="));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/subjects")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_needs_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/_internal/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
