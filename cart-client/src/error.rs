//! Client error types

use shared::error::{ApiErrorBody, ErrorCode, StockDetails};
use thiserror::Error;

/// Transport-level error from a remote collaborator
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request did not finish within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Structured error body from the service
    #[error("API error {status}: {}", body.message_or_default())]
    Api { status: u16, body: ApiErrorBody },

    /// Authentication required
    #[error("Authentication required")]
    Unauthorized,

    /// Permission denied
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Business code carried by this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Api { body, .. } => body.code(),
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Http(e) if e.is_timeout() => ErrorCode::Timeout,
            Self::Http(_) => ErrorCode::NetworkError,
            _ => ErrorCode::Unknown,
        }
    }

    /// Stock counts if the service rejected a quantity for lack of stock
    pub fn stock_conflict(&self) -> Option<StockDetails> {
        match self {
            Self::Api { body, .. } if body.code() == ErrorCode::InsufficientStock => {
                Some(body.stock_details().unwrap_or_default())
            }
            _ => None,
        }
    }

    /// Message suitable for a notice
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { body, .. } => body.message_or_default(),
            Self::Forbidden(m) | Self::NotFound(m) | Self::Validation(m) | Self::Internal(m)
                if !m.is_empty() =>
            {
                m.clone()
            }
            other => other.code().message().to_string(),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
