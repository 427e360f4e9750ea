//! Session tokens and the authenticated-user extractor.
//!
//! Identity itself comes from outside (an OAuth provider in front of the
//! app). This module only issues opaque tokens and resolves them back to a
//! user. Tokens are stored as SHA-256 digests, never in plain text.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, request::Parts};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::api::{ApiError, SharedState};
use super::models::User;

/// A fresh random session token, handed to the client once.
pub fn new_session_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Hex SHA-256 digest of a token; the only form that is persisted.
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Unix timestamp at which a session created at `now` expires.
pub fn session_expiry(now: i64, ttl_hours: u32) -> i64 {
    now.saturating_add(i64::from(ttl_hours) * 3600)
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// The user behind the request's bearer token. Rejects with 401.
pub struct AuthUser {
    pub user: User,
    pub token_hash: String,
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let token_hash = hash_token(token);
        let now = chrono::Utc::now().timestamp();

        let lookup = token_hash.clone();
        let user = state
            .db
            .call(move |db| db.user_for_session(&lookup, now))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        match user {
            Some(user) => Ok(AuthUser { user, token_hash }),
            None => {
                debug!("Rejected unknown or expired session");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
