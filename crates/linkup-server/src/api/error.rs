//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use linkup_core::LinkupError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - Operation cannot be completed in the current lifecycle state.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },

    /// 503 Service Unavailable - The Bluetooth host could not serve the request.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "INVALID_ADDRESS",
    "message": "Invalid device address: 'not-an-address'. Expected format 'AA:BB:CC:DD:EE:FF'.",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "INVALID_ADDRESS").
    #[schema(example = "INVALID_ADDRESS")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Invalid device address: 'not-an-address'. Expected format 'AA:BB:CC:DD:EE:FF'.")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// HTTP status this error is answered with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn into_body(self) -> ErrorResponse {
        let (error, message, details) = match self {
            Self::BadRequest {
                error_code,
                message,
            }
            | Self::NotFound {
                error_code,
                message,
            }
            | Self::Conflict {
                error_code,
                message,
            } => (error_code, message, None),
            Self::InternalError {
                error_code,
                message,
                details,
            }
            | Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => (error_code, message, details),
        };

        ErrorResponse {
            error,
            message,
            details: details.map(serde_json::Value::String),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }

        (status, Json(self.into_body())).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::InternalError { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        };
        let reason = self.status().canonical_reason().unwrap_or("Error");
        write!(f, "{reason}: {message}")
    }
}

impl std::error::Error for ApiError {}

/// Convert from linkup_core errors, following their HTTP classification.
impl From<LinkupError> for ApiError {
    fn from(err: LinkupError) -> Self {
        let error_code = err.error_code().to_string();
        let message = err.to_string();

        match err.http_status_code() {
            400 => Self::BadRequest {
                error_code,
                message,
            },
            404 => Self::NotFound {
                error_code,
                message,
            },
            409 => Self::Conflict {
                error_code,
                message,
            },
            503 => Self::ServiceUnavailable {
                error_code,
                message,
                details: None,
            },
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::BadRequest {
            error_code: "test_error".to_string(),
            message: "Test message".to_string(),
        };
        assert_eq!(err.to_string(), "Bad Request: Test message");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_details_are_carried_into_body() {
        let body = ApiError::ServiceUnavailable {
            error_code: "BLUETOOTH_UNAVAILABLE".to_string(),
            message: "Bluetooth host unavailable".to_string(),
            details: Some("org.bluez.Error.NotReady".to_string()),
        }
        .into_body();

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "BLUETOOTH_UNAVAILABLE");
        assert_eq!(json["details"], "org.bluez.Error.NotReady");
    }

    #[test]
    fn test_linkup_errors_keep_their_status() {
        let cases = [
            (LinkupError::InvalidAddress("x".into()), StatusCode::BAD_REQUEST),
            (LinkupError::DeviceNotFound("x".into()), StatusCode::NOT_FOUND),
            (LinkupError::AlreadyRegistered, StatusCode::CONFLICT),
            (LinkupError::AdapterNotFound, StatusCode::SERVICE_UNAVAILABLE),
            (
                LinkupError::ConfigValidationError("bad".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_error_code_is_carried_over() {
        let err = ApiError::from(LinkupError::EnableRequestFailed("radio busy".into()));
        match err {
            ApiError::ServiceUnavailable { error_code, .. } => {
                assert_eq!(error_code, "ENABLE_REQUEST_FAILED");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
