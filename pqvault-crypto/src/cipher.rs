//! ChaCha20-Poly1305 authenticated encryption.

use crate::encoding::{base64_array, base64_bytes};
use crate::error::{CryptoError, CryptoResult};
use crate::key::SymmetricKey;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// ChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Ciphertext bundled with the random nonce it was sealed under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    #[serde(with = "base64_array")]
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext followed by the Poly1305 tag.
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

/// Returns a fresh random nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

/// Seals `plaintext` under `key` and an explicit nonce, authenticating `aad`.
///
/// The caller guarantees the (key, nonce) pair is never reused.
pub fn seal(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Encryption(format!("aead seal failed: {e}")))
}

/// Opens a ciphertext produced by [`seal`].
///
/// Any failure (wrong key, wrong nonce, wrong `aad`, tampering, truncation)
/// is reported as the same opaque [`CryptoError::Decryption`].
pub fn open(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Decryption);
    }
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption)
}

/// Encrypts under a fresh random nonce.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8], aad: &[u8]) -> CryptoResult<EncryptedData> {
    let nonce = generate_nonce();
    let ciphertext = seal(key, &nonce, plaintext, aad)?;
    Ok(EncryptedData { nonce, ciphertext })
}

/// Decrypts data produced by [`encrypt`].
pub fn decrypt(key: &SymmetricKey, data: &EncryptedData, aad: &[u8]) -> CryptoResult<Vec<u8>> {
    open(key, &data.nonce, &data.ciphertext, aad)
}
