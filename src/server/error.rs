//! HTTP-level errors.
//!
//! Upstream failures never reach this type; they are rendered into the
//! response content by the completion client. What remains are request
//! problems and unexpected failures inside a handler.

use std::any::Any;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    InvalidRequest { status: StatusCode, message: String },

    #[error("{0}")]
    Internal(String),
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a panic payload caught by `CatchPanicLayer` to a 500 response.
    pub fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
        let detail = if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "internal server error".to_string()
        };
        error!(detail = %detail, "Handler panicked");
        ApiError::Internal(detail).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        warn!(status = %rejection.status(), error = %message, "Rejected request body");
        ApiError::InvalidRequest {
            status: rejection.status(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorDetail {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
