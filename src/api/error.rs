//! API error body

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::keystore::KeyStoreError;

/// Structured error returned by every endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            error: "invalid_request".to_string(),
            message: message.into(),
        }
    }

    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self {
            error: "generation_failed".to_string(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "invalid_request" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<KeyStoreError> for ErrorResponse {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::Generation { .. } => Self::generation_failed(err.to_string()),
            KeyStoreError::InvalidDuration(_) | KeyStoreError::DurationOutOfRange(_) => {
                Self::invalid_request(err.to_string())
            }
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}
