//! Session tokens and the current-user extractor.
//!
//! Sessions are HS256 JWTs carrying the user id in `sub`. Whatever performs the
//! sign-in flow signs them with the shared `SESSION_SECRET`; this service only
//! verifies them (and issues them itself in test mode).

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::response::ApiError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "unicloud_session";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid session subject")]
    InvalidSubject,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
}

/// A verified session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub expires_at: u64,
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct SessionManager {
    decoding: DecodingKey,
    encoding: EncodingKey,
    ttl_seconds: u64,
    validation: Validation,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(secret: &[u8], ttl_seconds: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            ttl_seconds,
            validation,
        }
    }

    /// Issue a session token for `user_id`.
    pub fn issue(&self, user_id: &str) -> Result<String, SessionError> {
        validate_subject(user_id)?;

        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_seconds),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Verify a token's signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Session, SessionError> {
        let claims =
            jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)?.claims;
        validate_subject(&claims.sub)?;

        Ok(Session {
            user_id: claims.sub,
            expires_at: claims.exp,
        })
    }

    /// The cookie that carries `token` back to the browser.
    pub fn cookie(token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build()
    }
}

/// User ids become object-store path segments and index keys.
fn validate_subject(user_id: &str) -> Result<(), SessionError> {
    let valid = !user_id.is_empty()
        && user_id.len() <= 128
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        && user_id != "."
        && user_id != "..";
    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidSubject)
    }
}

/// Candidate session tokens in the order they are tried: the session cookie, then a bearer token.
fn session_tokens(headers: &HeaderMap) -> Vec<String> {
    let mut tokens = Vec::with_capacity(2);

    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        tokens.push(cookie.value().to_string());
    }
    if let Some(token) = bearer_token(headers) {
        tokens.push(token);
    }

    tokens
}

/// Token from `Authorization: Bearer <token>`. The scheme is case-insensitive.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

/// The authenticated user of a request. Rejects with 401 when the session is missing or invalid.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, ApiError> {
        let tokens = session_tokens(&parts.headers);
        if tokens.is_empty() {
            tracing::debug!("No session token on request");
            return Err(ApiError::unauthorized());
        }

        for token in &tokens {
            match state.sessions.verify(token) {
                Ok(session) => return Ok(CurrentUser { id: session.user_id }),
                Err(e) => tracing::debug!(error = %e, "Rejected session token"),
            }
        }

        Err(ApiError::unauthorized())
    }
}
