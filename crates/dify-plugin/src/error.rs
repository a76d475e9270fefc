//! Resource error handling with structured responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

/// Errors raised while serving a resource call.
///
/// Non-2xx upstream responses are not errors; they are relayed as-is.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Plugin settings are present but incomplete.
    #[error("{0}")]
    Configuration(String),

    /// Plugin `jsonData` could not be parsed.
    #[error("Invalid JSONData")]
    InvalidSettings(#[source] serde_json::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("Request body too large (max {})", display_limit(.limit))]
    PayloadTooLarge { limit: usize },

    #[error("Streaming unsupported")]
    StreamingUnsupported,

    /// Transport failure on an endpoint that reports it as a server error.
    #[error("Failed to call Dify API: {0}")]
    Upstream(String),

    /// Transport failure on an endpoint that reports it as a gateway error.
    #[error("Failed to call Dify API: {0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidSettings(_)
            | Self::StreamingUnsupported
            | Self::Upstream(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidSettings(_) => "INVALID_SETTINGS",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::StreamingUnsupported => "STREAMING_UNSUPPORTED",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::BadGateway(_) => "BAD_GATEWAY",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Whole mebibytes as `NMB`, anything else in bytes.
fn display_limit(limit: &usize) -> String {
    const MIB: usize = 1024 * 1024;
    if *limit >= MIB && limit % MIB == 0 {
        format!("{}MB", limit / MIB)
    } else {
        format!("{limit} bytes")
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            match &self {
                ApiError::InvalidSettings(source) => {
                    error!(error_code = code, source = %source, "Resource error");
                }
                _ => error!(error_code = code, message = %message, "Resource error"),
            }
        } else {
            debug!(error_code = code, message = %message, "Client error");
        }

        let body = ErrorResponse {
            error: message,
            code,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for resource handlers
pub type ApiResult<T> = Result<T, ApiError>;
