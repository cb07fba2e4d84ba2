//! Self-describing ciphertext produced by [`HybridCipher`](crate::HybridCipher).
//!
//! Wire form (JSON, camelCase):
//!
//! ```json
//! {
//!   "v": 1,
//!   "algorithm": "ML-KEM-768",
//!   "keyId": "0192...",
//!   "nonce": "<base64, 12 bytes>",
//!   "ciphertext": "<base64, payload + 16 byte tag>",
//!   "encapsulatedKey": "<base64, KEM ciphertext || wrapped data key>",
//!   "createdAt": "2026-01-01T00:00:00.000Z"
//! }
//! ```

use crate::error::{VaultError, VaultResult};
use chrono::{DateTime, Utc};
use pqvault_crypto::encoding::{base64_array, base64_bytes};
use pqvault_crypto::{KEY_SIZE, KemAlgorithm, KeyId, NONCE_SIZE, TAG_SIZE};
use serde::{Deserialize, Serialize};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Length of a data key sealed under a KEK.
pub const WRAPPED_KEY_SIZE: usize = KEY_SIZE + TAG_SIZE;

const AAD_PREFIX: &[u8] = b"pqvault/envelope/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridEnvelope {
    #[serde(rename = "v")]
    pub version: u8,
    pub algorithm: KemAlgorithm,
    pub key_id: KeyId,
    #[serde(with = "base64_array")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub encapsulated_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl HybridEnvelope {
    /// Associated data authenticated by both the payload and the wrapped data key.
    pub(crate) fn associated_data(
        algorithm: KemAlgorithm,
        key_id: &KeyId,
        created_at: DateTime<Utc>,
    ) -> Vec<u8> {
        let mut aad = Vec::with_capacity(AAD_PREFIX.len() + 48);
        aad.extend_from_slice(AAD_PREFIX);
        aad.push(b'|');
        aad.extend_from_slice(algorithm.as_str().as_bytes());
        aad.push(b'|');
        aad.extend_from_slice(key_id.as_uuid().as_bytes());
        aad.push(b'|');
        aad.extend_from_slice(&created_at.timestamp_millis().to_be_bytes());
        aad
    }

    pub(crate) fn aad(&self) -> Vec<u8> {
        Self::associated_data(self.algorithm, &self.key_id, self.created_at)
    }

    /// Splits `encapsulated_key` into the KEM ciphertext and the wrapped data key.
    pub(crate) fn split_encapsulated_key(&self) -> VaultResult<(&[u8], &[u8])> {
        let kem_len = self.algorithm.ciphertext_len();
        if self.encapsulated_key.len() != kem_len + WRAPPED_KEY_SIZE {
            return Err(VaultError::DecryptionFailed);
        }
        Ok(self.encapsulated_key.split_at(kem_len))
    }

    pub fn to_json(&self) -> VaultResult<String> {
        serde_json::to_string(self).map_err(|e| VaultError::Serialization(e.to_string()))
    }

    /// Parses an envelope, rejecting unknown format versions.
    pub fn from_json(json: &str) -> VaultResult<Self> {
        let envelope: Self =
            serde_json::from_str(json).map_err(|_| VaultError::DecryptionFailed)?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(VaultError::DecryptionFailed);
        }
        Ok(envelope)
    }
}
