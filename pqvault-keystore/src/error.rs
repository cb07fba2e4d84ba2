//! Key store error types.

use pqvault_crypto::{CryptoError, KeyId, KeyStatus};
use std::time::Duration;
use thiserror::Error;

/// Result type for key store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in key store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    KeyNotFound(KeyId),

    #[error("key already exists: {0}")]
    AlreadyExists(KeyId),

    #[error("invalid status transition for key {id}: {from} -> {to}")]
    InvalidTransition {
        id: KeyId,
        from: KeyStatus,
        to: KeyStatus,
    },

    #[error("key record failed integrity check: {0}")]
    Corrupted(KeyId),

    #[error("invalid store passphrase")]
    InvalidPassphrase,

    #[error("key store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("KMS request failed: {0}")]
    Kms(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl StoreError {
    /// Infrastructure failures a caller may retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout(_) | StoreError::Kms(_) | StoreError::Io(_) | StoreError::Storage(_)
        )
    }
}
