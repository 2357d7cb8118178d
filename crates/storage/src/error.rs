//! Errors raised by the blob store, the model store and the cache.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Blob store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode {what}: {reason}")]
    Serialization { what: String, reason: String },

    #[error("Cache backend error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    pub(crate) fn serialization(what: impl Into<String>, reason: impl ToString) -> Self {
        StorageError::Serialization {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
