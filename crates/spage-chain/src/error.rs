//! Error types for the spage-chain crate

use thiserror::Error;

/// Result type alias using `ChainError`
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors that can occur while talking to the chain
#[derive(Error, Debug)]
pub enum ChainError {
    /// The RPC endpoint returned an error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Malformed response payload
    #[error("decode error: {0}")]
    Decode(String),

    /// Malformed address or hash literal
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Request timed out
    #[error("RPC request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChainError::Timeout { seconds: 30 }
        } else if err.is_connect() {
            ChainError::Connection(err.to_string())
        } else {
            ChainError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Decode(err.to_string())
    }
}
