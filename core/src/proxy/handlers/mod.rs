//! Route handlers

pub mod auth;
pub mod resources;

use axum::http::HeaderMap;

/// Correlation id for log lines: the caller's `x-request-id` or a fresh one.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
}
