//! Bearer-token authentication middleware.
//!
//! Every non-public route is wrapped in [`require_bearer`]. A missing or
//! malformed `Authorization` header is a 401; a well-formed header with the
//! wrong token is a 403. Token comparison is constant-time.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use super::config::NetworkConfig;
use super::error::ApiError;

/// Rejects requests that do not carry the configured bearer token.
pub async fn require_bearer(
    State(config): State<Arc<NetworkConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = bearer_token(request.headers()).ok_or(ApiError::MissingAuth)?;
    if !token_matches(presented, &config.auth_token) {
        return Err(ApiError::InvalidToken);
    }
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
}

fn token_matches(presented: &str, expected: &str) -> bool {
    // ct_eq on slices already folds a length mismatch into the result.
    bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}
