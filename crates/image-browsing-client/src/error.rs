//! Error types for the image-browsing HTTP client

use image_browsing_cache::TransportError;
use std::fmt;

/// Errors that can occur when talking to the image-browsing routes
#[derive(Debug)]
pub enum ClientError {
    /// HTTP request failed
    Http(reqwest::Error),
    /// Failed to parse JSON response
    Json(serde_json::Error),
    /// Non-success HTTP status
    Status(u16),
    /// The server answered `success: false`
    Api(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {}", e),
            Self::Json(e) => write!(f, "JSON parse error: {}", e),
            Self::Status(status) => write!(f, "Server returned status {}", status),
            Self::Api(msg) => write!(f, "API error: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<ClientError> for TransportError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Http(e) if e.is_decode() => Self::Decode(e.to_string()),
            ClientError::Http(e) => Self::Network(e.to_string()),
            ClientError::Json(e) => Self::Decode(e.to_string()),
            ClientError::Status(status) => Self::Status(status),
            ClientError::Api(msg) => Self::Server(msg),
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
