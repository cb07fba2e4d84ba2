//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by the primitive layer.
///
/// Messages never carry key bytes or primitive internals.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("KEM operation failed: {0}")]
    KemOperationFailed(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Authentication failure. Deliberately carries no detail.
    #[error("decryption failed")]
    Decryption,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}
