//! Caller-facing error taxonomy.

use pqvault_crypto::{CryptoError, KeyId};
use pqvault_keystore::StoreError;
use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors surfaced to callers of the encryption core.
///
/// Messages never include key material or primitive internals.
/// `DecryptionFailed` deliberately does not say which stage failed.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no active key available")]
    NoKeyAvailable,

    #[error("key not found: {0}")]
    KeyNotFound(KeyId),

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("key rotation already in progress")]
    RotationInProgress,

    #[error("key rotation failed: {0}")]
    RotationFailed(String),

    #[error("KEM operation failed")]
    KemOperationFailed,

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("key store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    /// Infrastructure failures a caller may retry with backoff.
    ///
    /// Cryptographic failures (`DecryptionFailed`, `KeyNotFound`) are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::KemOperationFailed
                | VaultError::Store(_)
                | VaultError::RotationFailed(_)
                | VaultError::RotationInProgress
        )
    }
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::KeyNotFound(id) => VaultError::KeyNotFound(id),
            StoreError::Crypto(e) => e.into(),
            other => VaultError::Store(other.to_string()),
        }
    }
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::UnsupportedAlgorithm(name) => VaultError::UnsupportedAlgorithm(name),
            CryptoError::Decryption => VaultError::DecryptionFailed,
            CryptoError::KemOperationFailed(_)
            | CryptoError::Encryption(_)
            | CryptoError::KeyDerivation(_)
            | CryptoError::InvalidKeyLength { .. } => VaultError::KemOperationFailed,
        }
    }
}
