//! Error types for the listing cache

use std::fmt;

/// Failure reported by a [`Transport`](crate::Transport) implementation.
///
/// `Clone` so a deduplicated read can hand the same outcome to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a response (connection refused, timeout, ...)
    Network(String),
    /// The server answered with a non-success HTTP status
    Status(u16),
    /// The server answered `success: false`
    Server(String),
    /// The response body could not be decoded
    Decode(String),
    /// The server broke the conditional request contract
    Protocol(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {msg}"),
            Self::Status(status) => write!(f, "Server returned status {status}"),
            Self::Server(msg) => write!(f, "Server error: {msg}"),
            Self::Decode(msg) => write!(f, "Decode error: {msg}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Errors surfaced by cache operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The operation was superseded by a newer one; never shown to the user
    Cancelled,
    Transport(TransportError),
    InvalidPath(String),
}

impl CacheError {
    /// Cancellation is expected during fast navigation and must be ignored silently
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Transport(err) => write!(f, "Transport error: {err}"),
            Self::InvalidPath(path) => write!(f, "Invalid path: {path}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for CacheError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

/// Errors from durable storage. Logged and swallowed by the store, never surfaced.
#[derive(Debug)]
pub enum StorageError {
    QuotaExceeded { needed: usize, quota: usize },
    Io(Box<std::io::Error>),
    Serialize(serde_json::Error),
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaExceeded { needed, quota } => {
                write!(f, "Storage quota exceeded: {needed} bytes needed, {quota} available")
            }
            Self::Io(err) => write!(f, "Storage IO error: {err}"),
            Self::Serialize(err) => write!(f, "Storage serialization error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err.as_ref()),
            Self::Serialize(err) => Some(err),
            Self::QuotaExceeded { .. } => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err)
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
