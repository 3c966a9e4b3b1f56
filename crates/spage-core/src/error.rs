//! Error types for the spage-core crate

use thiserror::Error;

use spage_chain::ChainError;
use spage_store::StoreError;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in the indexing and serving core
#[derive(Error, Debug)]
pub enum CoreError {
    /// Store operation failed; the cycle aborts and retries next tick
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Chain query failed; the cycle aborts and retries next tick
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Uploaded bytes are not a valid content-addressed archive
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// Upload exceeds the configured byte cap
    #[error("upload of {size} bytes exceeds the {max}-byte cap")]
    UploadTooLarge { size: usize, max: usize },

    /// A requested name or CID has no state in the store
    #[error("not found: {0}")]
    NotFound(String),
}
