//! Error types for table synchronization and caching.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure raised by a record deserializer for a single raw record.
///
/// Transform failures never abort a table load; the offending record is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransformError(String);

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Missing or unreadable property on a raw record.
    pub fn missing_property(key: &str) -> Self {
        Self(format!("missing property '{}'", key))
    }
}

impl From<serde_json::Error> for TransformError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// Typed cache access errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The entry was stored with a different element type than requested.
    #[error("cached table '{key}' holds {actual}, requested {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Errors that can occur while synchronizing a table.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure or non-2xx response from the remote API
    #[error("network error{}: {message}", status_suffix(.status))]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// Response body is missing the expected JSON structure
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A single record could not be transformed
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// External cancellation was observed
    #[error("sync cancelled")]
    Cancelled,

    /// The persisted snapshot store is not accessible
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Typed cache mismatch
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl SyncError {
    /// Create a network error without an HTTP status (transport failure).
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            status: None,
            message: message.into(),
        }
    }

    /// Create a network error from a non-2xx HTTP status.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::Network {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a malformed response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageUnavailable(message.into())
    }

    /// True when the failure was caused by cancellation rather than data or network problems.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// HTTP status if this is a network error carrying one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            _ => None,
        }
    }
}
