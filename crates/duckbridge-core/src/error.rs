use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Trait for domain errors that can be converted to HTTP responses
///
/// The server layer turns these into the `{ "error": { message, type } }`
/// envelope, keeping domain errors decoupled from axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (`invalid_request_error` or `internal_server_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;
}

/// OpenAI-style error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail inside [`ErrorBody`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable message
    pub message: String,
    /// Error classification
    #[serde(rename = "type")]
    pub error_type: String,
}

/// Build the error envelope for any [`HttpError`]
pub fn error_body<E: HttpError + ?Sized>(error: &E) -> ErrorBody {
    ErrorBody {
        error: ErrorDetail {
            message: error.client_message(),
            error_type: error.error_type().to_owned(),
        },
    }
}
