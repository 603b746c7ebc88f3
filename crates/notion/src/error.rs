//! Error types for the Notion client.

use tablesync_core::SyncError;
use thiserror::Error;

/// Result type alias for Notion client operations.
pub type Result<T> = std::result::Result<T, NotionError>;

/// Errors that can occur while talking to the Notion API.
#[derive(Debug, Error)]
pub enum NotionError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from Notion
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (bad identifier, missing configuration, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or malformed integration token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl NotionError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<NotionError> for SyncError {
    fn from(err: NotionError) -> Self {
        match err {
            NotionError::Api { status, message } => SyncError::http_status(status, message),
            NotionError::Json(e) => SyncError::malformed(e.to_string()),
            other => SyncError::network(other.to_string()),
        }
    }
}
