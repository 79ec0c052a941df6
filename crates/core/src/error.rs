//! Error types for the Ancient domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `ErrorKind` is the
//! transport-independent classification the retry layer decides on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Ancient operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes for one request attempt.
///
/// Every transport or decode failure is mapped onto exactly one of these by
/// [`ProviderError::kind`]; nothing downstream inspects the concrete error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The provider throttled us. Retried with exponential backoff.
    RateLimited,
    /// The connection dropped or never came up. Retried without delay.
    ConnectionFailure,
    /// Malformed request, bad credentials, unknown model, exhausted quota.
    RequestRejected,
    /// The wire stream could not be parsed.
    DecodeFailure,
    /// Anything not otherwise classified.
    Unexpected,
    /// The consumer stopped reading the event stream.
    Cancelled,
}

impl ErrorKind {
    /// Whether another attempt may succeed where this one failed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ConnectionFailure | Self::DecodeFailure
        )
    }

    /// Stable snake_case name, used in logs and error details.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::ConnectionFailure => "connection_failure",
            Self::RequestRejected => "request_rejected",
            Self::DecodeFailure => "decode_failure",
            Self::Unexpected => "unexpected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed stream data: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Classify this error for the retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Network(_) | Self::Timeout(_) | Self::StreamInterrupted(_) => {
                ErrorKind::ConnectionFailure
            }
            Self::ApiError { status_code, .. } => match *status_code {
                429 => ErrorKind::RateLimited,
                408 | 500 | 502 | 503 | 504 => ErrorKind::ConnectionFailure,
                400..=499 => ErrorKind::RequestRejected,
                _ => ErrorKind::Unexpected,
            },
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) | Self::NotConfigured(_) => {
                ErrorKind::RequestRejected
            }
            Self::Decode(_) => ErrorKind::DecodeFailure,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::InvalidArguments("path: missing required field".into()));
        assert!(err.to_string().contains("Invalid tool arguments"));
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn classification_by_variant() {
        assert_eq!(
            ProviderError::RateLimited { retry_after_secs: 5 }.kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            ProviderError::Network("refused".into()).kind(),
            ErrorKind::ConnectionFailure
        );
        assert_eq!(
            ProviderError::StreamInterrupted("reset".into()).kind(),
            ErrorKind::ConnectionFailure
        );
        assert_eq!(
            ProviderError::AuthenticationFailed("bad key".into()).kind(),
            ErrorKind::RequestRejected
        );
        assert_eq!(
            ProviderError::Decode("not json".into()).kind(),
            ErrorKind::DecodeFailure
        );
    }

    #[test]
    fn classification_by_status() {
        let status = |code| ProviderError::ApiError {
            status_code: code,
            message: String::new(),
        };
        assert_eq!(status(429).kind(), ErrorKind::RateLimited);
        assert_eq!(status(503).kind(), ErrorKind::ConnectionFailure);
        assert_eq!(status(400).kind(), ErrorKind::RequestRejected);
        assert_eq!(status(402).kind(), ErrorKind::RequestRejected);
        assert_eq!(status(501).kind(), ErrorKind::Unexpected);
        assert_eq!(status(0).kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::ConnectionFailure.is_retryable());
        assert!(ErrorKind::DecodeFailure.is_retryable());
        assert!(!ErrorKind::RequestRejected.is_retryable());
        assert!(!ErrorKind::Unexpected.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }
}
