//! API-key gate for the conversion routes.
//!
//! Mounted with [`axum::middleware::from_fn_with_state`] on the protected
//! sub-router, so the check runs before any extractor touches the body and
//! a rejected request never reaches intake or the converter.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::config::API_KEY_HEADER;
use crate::error::ApiError;
use crate::server::AppState;

/// Exact comparison of the provided key against the configured secret.
pub fn is_authorized(provided: Option<&str>, expected: &str) -> bool {
    matches!(provided, Some(key) if !key.is_empty() && key == expected)
}

/// Read `X-API-Key`; non-ASCII header values count as absent.
pub fn provided_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
}

/// Middleware rejecting requests without the correct `X-API-Key`.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !is_authorized(provided_key(request.headers()), &state.api_key) {
        debug!("Rejected {} {}: bad API key", request.method(), request.uri().path());
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}
