//! Error taxonomy for the edge layer and the JSON error envelope.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::{Map, Value};
use thiserror::Error;

/// Startup-time configuration failures. Fatal, never turned into a response.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be set when running in production")]
    MissingBackendUrl { var: &'static str },

    #[error("invalid backend URL {url:?}: {reason}")]
    InvalidBackendUrl { url: String, reason: String },
}

/// Failures of a single forwarding call.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    #[error("backend connection not established within {0:?}")]
    ConnectTimeout(Duration),

    #[error("path {0:?} does not map to a backend resource")]
    Unroutable(String),

    #[error("backend request failed: {0}")]
    Transport(String),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout(_) | Self::ConnectTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Unroutable(_) => StatusCode::NOT_FOUND,
            Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the browser.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(_) => {
                "Backend timeout: the server took too long to respond. Please try again.".to_string()
            }
            Self::ConnectTimeout(_) => {
                "Backend timeout: could not connect to the server. Please try again.".to_string()
            }
            Self::Unroutable(_) => "Not found".to_string(),
            Self::Transport(msg) => format!("Proxy error: {}", msg),
        }
    }

    pub fn into_envelope(self, key: EnvelopeKey) -> Response {
        error_envelope(self.status(), key, &self.user_message())
    }
}

impl From<reqwest::Error> for ForwardError {
    fn from(e: reqwest::Error) -> Self {
        // The URL is internal topology; keep it out of the message.
        Self::Transport(e.without_url().to_string())
    }
}

/// Field name carrying the message in an error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKey {
    /// `{"detail": ...}`
    Detail,
    /// `{"error": ...}`
    Error,
}

impl EnvelopeKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detail => "detail",
            Self::Error => "error",
        }
    }
}

pub fn error_envelope(status: StatusCode, key: EnvelopeKey, message: &str) -> Response {
    let mut body = Map::new();
    body.insert(key.as_str().to_string(), Value::String(message.to_string()));
    let mut response = (status, Json(Value::Object(body))).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
