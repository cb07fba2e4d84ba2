//! Sealed key records shared by the local store implementations.
//!
//! The private key is AEAD-encrypted under the store master key with the
//! serialized metadata as associated data, so editing any metadata field at
//! rest (status, expiry, public key) breaks the record's integrity check.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use pqvault_crypto::{
    CryptoError, EncryptedData, KeyMetadata, KeyStatus, PrivateKey, QuantumKeyPair, SymmetricKey,
    decrypt, encrypt,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

const RECORD_AAD_PREFIX: &[u8] = b"pqvault/keystore/v1";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedKeyRecord {
    pub metadata: KeyMetadata,
    pub sealed_private_key: EncryptedData,
}

/// Associated data binding a sealed private key to its metadata.
pub fn record_aad(metadata: &KeyMetadata) -> StoreResult<Vec<u8>> {
    let mut aad = RECORD_AAD_PREFIX.to_vec();
    aad.extend_from_slice(&serde_json::to_vec(metadata)?);
    Ok(aad)
}

impl SealedKeyRecord {
    pub fn seal(master: &SymmetricKey, key: &QuantumKeyPair) -> StoreResult<Self> {
        let aad = record_aad(key.metadata())?;
        let sealed_private_key = encrypt(master, key.private_key().as_bytes(), &aad)?;
        Ok(Self {
            metadata: key.metadata().clone(),
            sealed_private_key,
        })
    }

    pub fn unseal(&self, master: &SymmetricKey) -> StoreResult<QuantumKeyPair> {
        let aad = record_aad(&self.metadata)?;
        let private = decrypt(master, &self.sealed_private_key, &aad).map_err(|e| match e {
            CryptoError::Decryption => StoreError::Corrupted(self.metadata.id),
            other => StoreError::Crypto(other),
        })?;
        Ok(QuantumKeyPair::new(
            self.metadata.clone(),
            PrivateKey::from_bytes(private),
        ))
    }

    /// Checks integrity and returns the metadata without keeping private bytes.
    pub fn verified_metadata(&self, master: &SymmetricKey) -> StoreResult<KeyMetadata> {
        let key = self.unseal(master)?;
        Ok(key.metadata().clone())
    }

    /// Re-seals with new metadata (status changes alter the associated data).
    pub fn reseal(&self, master: &SymmetricKey, metadata: KeyMetadata) -> StoreResult<Self> {
        let current = self.unseal(master)?;
        let updated = QuantumKeyPair::new(metadata, current.private_key().clone());
        Self::seal(master, &updated)
    }

    pub fn wipe(&mut self) {
        self.sealed_private_key.ciphertext.zeroize();
        self.sealed_private_key.nonce.zeroize();
    }
}

/// Applies a status change to metadata, enforcing the lifecycle state machine.
///
/// Leaving `Active` stamps `retired_at`; the `Rotating -> Active` rollback clears it.
pub fn apply_transition(
    metadata: &mut KeyMetadata,
    status: KeyStatus,
    at: DateTime<Utc>,
) -> StoreResult<()> {
    if !metadata.status.can_transition_to(status) {
        return Err(StoreError::InvalidTransition {
            id: metadata.id,
            from: metadata.status,
            to: status,
        });
    }

    match status {
        KeyStatus::Active => metadata.retired_at = None,
        _ if metadata.retired_at.is_none() => metadata.retired_at = Some(at),
        _ => {}
    }
    metadata.status = status;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pqvault_crypto::{KemAlgorithm, KeyId, generate_random_key};

    fn sample_key() -> QuantumKeyPair {
        let now = Utc::now();
        QuantumKeyPair::new(
            KeyMetadata {
                id: KeyId::new(),
                algorithm: KemAlgorithm::MlKem768,
                public_key: vec![1, 2, 3],
                created_at: now,
                expires_at: now + chrono::Duration::days(90),
                status: KeyStatus::Active,
                retired_at: None,
            },
            PrivateKey::from_bytes(vec![9; 32]),
        )
    }

    #[test]
    fn seal_unseal_roundtrip() {
        let master = generate_random_key();
        let key = sample_key();
        let record = SealedKeyRecord::seal(&master, &key).unwrap();
        let back = record.unseal(&master).unwrap();
        assert_eq!(back.metadata(), key.metadata());
        assert_eq!(back.private_key().as_bytes(), key.private_key().as_bytes());
    }

    #[test]
    fn metadata_tamper_is_detected() {
        let master = generate_random_key();
        let mut record = SealedKeyRecord::seal(&master, &sample_key()).unwrap();
        record.metadata.status = KeyStatus::Expired;
        assert!(matches!(record.unseal(&master), Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn reseal_tracks_new_metadata() {
        let master = generate_random_key();
        let record = SealedKeyRecord::seal(&master, &sample_key()).unwrap();
        let mut meta = record.metadata.clone();
        apply_transition(&mut meta, KeyStatus::Rotating, Utc::now()).unwrap();

        let resealed = record.reseal(&master, meta).unwrap();
        assert_eq!(
            resealed.verified_metadata(&master).unwrap().status,
            KeyStatus::Rotating
        );
    }

    #[test]
    fn transition_stamps_and_clears_retired_at() {
        let mut meta = sample_key().metadata().clone();
        let t = Utc::now();
        apply_transition(&mut meta, KeyStatus::Rotating, t).unwrap();
        assert_eq!(meta.retired_at, Some(t));

        apply_transition(&mut meta, KeyStatus::Active, t).unwrap();
        assert_eq!(meta.retired_at, None);

        apply_transition(&mut meta, KeyStatus::Rotating, t).unwrap();
        apply_transition(&mut meta, KeyStatus::Expired, t + chrono::Duration::seconds(5)).unwrap();
        assert_eq!(meta.retired_at, Some(t), "retention starts when the key left Active");
    }

    #[test]
    fn invalid_transition_rejected() {
        let mut meta = sample_key().metadata().clone();
        meta.status = KeyStatus::Expired;
        let err = apply_transition(&mut meta, KeyStatus::Active, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: KeyStatus::Expired,
                to: KeyStatus::Active,
                ..
            }
        ));
    }
}
