//! Error types for the spage-store crate

use thiserror::Error;

use crate::cid_utils::Cid;

/// Result type alias using `StoreError`
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Block not found
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// Invalid CID
    #[error("invalid CID: {0}")]
    InvalidCid(String),

    /// Byte stream is not a valid content-addressed archive
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// IPFS API error
    #[error("IPFS API error: {0}")]
    IpfsApi(String),

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Pin operation failed
    #[error("pin operation failed: {0}")]
    PinFailed(String),

    /// Timeout error
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout { seconds: 30 }
        } else if err.is_connect() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<cid::Error> for StoreError {
    fn from(err: cid::Error) -> Self {
        StoreError::InvalidCid(err.to_string())
    }
}
