use duckbridge_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Upstream statuses that describe a problem with the client's request
const CLIENT_ATTRIBUTABLE_STATUSES: [u16; 4] = [400, 413, 422, 429];

/// Errors that can occur while serving a chat completion
#[derive(Debug, Error)]
pub enum LlmError {
    /// Client sent a malformed or invalid request
    #[error("{0}")]
    Validation(String),

    /// Request content cannot be expressed upstream
    #[error("{0}")]
    UnsupportedContent(String),

    /// Challenge handshake failed
    #[error("failed to acquire upstream challenge token: {0}")]
    TokenAcquisition(String),

    /// A bounded wait elapsed
    #[error("timed out: {0}")]
    Timeout(String),

    /// Upstream answered with a non-success status or an in-band error
    #[error("upstream returned {status}: {body}")]
    Upstream {
        /// Status reported by the upstream
        status: u16,
        /// Response body or error code, as sent
        body: String,
    },

    /// Upstream stream was malformed or ended early
    #[error("upstream stream could not be decoded: {0}")]
    StreamDecode(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether the client caused this error
    pub fn is_client_fault(&self) -> bool {
        match self {
            Self::Validation(_) | Self::UnsupportedContent(_) => true,
            Self::Upstream { status, .. } => CLIENT_ATTRIBUTABLE_STATUSES.contains(status),
            Self::TokenAcquisition(_) | Self::Timeout(_) | Self::StreamDecode(_) | Self::Internal(_) => false,
        }
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnsupportedContent(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } if CLIENT_ATTRIBUTABLE_STATUSES.contains(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            Self::Upstream { .. }
            | Self::TokenAcquisition(_)
            | Self::Timeout(_)
            | Self::StreamDecode(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        if self.is_client_fault() {
            "invalid_request_error"
        } else {
            "internal_server_error"
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_bad_request() {
        let err = LlmError::Validation("model is required".to_owned());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_type(), "invalid_request_error");
        assert_eq!(err.client_message(), "model is required");
    }

    #[test]
    fn rate_limited_upstream_passes_through() {
        let err = LlmError::Upstream {
            status: 429,
            body: "ERR_CONVERSATION_LIMIT".to_owned(),
        };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_type(), "invalid_request_error");
    }

    #[test]
    fn other_upstream_statuses_are_internal() {
        let err = LlmError::Upstream {
            status: 503,
            body: String::new(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_type(), "internal_server_error");
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = LlmError::Internal(anyhow::anyhow!("secret detail"));
        assert_eq!(err.client_message(), "an internal error occurred");
    }
}
