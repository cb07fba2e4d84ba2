//! KMS/HSM-backed key store.
//!
//! Private keys never rest in this process unwrapped: they are wrapped by a
//! [`KmsClient`] (whose wrapping key lives in the HSM) and only unwrapped on
//! `retrieve`. Metadata is bound to each wrapped blob as associated data.
//!
//! Every KMS round trip is bounded by the store timeout so a stalled HSM
//! surfaces as [`StoreError::Timeout`] instead of hanging a rotation.

use crate::error::{StoreError, StoreResult};
use crate::locks::KeyLocks;
use crate::record::{apply_transition, record_aad};
use crate::SecureKeyStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pqvault_crypto::{
    CryptoError, EncryptedData, KeyId, KeyMetadata, KeyStatus, NONCE_SIZE, PrivateKey,
    QuantumKeyPair, SymmetricKey, decrypt, encrypt, generate_random_key,
};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use zeroize::Zeroize;

/// Remote key-wrapping service (cloud KMS, HSM).
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Wraps `plaintext` under the KMS-held key, authenticating `aad`.
    async fn wrap(&self, key_id: &KeyId, plaintext: &[u8], aad: &[u8]) -> StoreResult<Vec<u8>>;

    /// Reverses [`KmsClient::wrap`].
    async fn unwrap(&self, key_id: &KeyId, wrapped: &[u8], aad: &[u8]) -> StoreResult<Vec<u8>>;

    /// Destroys any KMS-side state for `key_id`; later unwraps must fail.
    async fn destroy(&self, key_id: &KeyId) -> StoreResult<()>;
}

struct KmsRecord {
    metadata: KeyMetadata,
    wrapped: Vec<u8>,
}

pub struct KmsKeyStore {
    client: Arc<dyn KmsClient>,
    records: RwLock<HashMap<KeyId, KmsRecord>>,
    locks: KeyLocks,
    timeout: Duration,
}

impl KmsKeyStore {
    pub fn new(client: Arc<dyn KmsClient>, timeout: Duration) -> Self {
        Self {
            client,
            records: RwLock::new(HashMap::new()),
            locks: KeyLocks::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout = ?self.timeout, "KMS request timed out");
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl SecureKeyStore for KmsKeyStore {
    async fn store(&self, key: &QuantumKeyPair) -> StoreResult<()> {
        let id = key.id();
        let _guard = self.locks.lock(&id).await;

        if self.records.read().await.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        let aad = record_aad(key.metadata())?;
        let wrapped = self
            .bounded("wrap", self.client.wrap(&id, key.private_key().as_bytes(), &aad))
            .await?;

        self.records.write().await.insert(
            id,
            KmsRecord {
                metadata: key.metadata().clone(),
                wrapped,
            },
        );
        debug!(key_id = %id, "stored KMS-wrapped key");
        Ok(())
    }

    async fn retrieve(&self, id: &KeyId) -> StoreResult<QuantumKeyPair> {
        let (metadata, wrapped) = {
            let records = self.records.read().await;
            let record = records.get(id).ok_or(StoreError::KeyNotFound(*id))?;
            (record.metadata.clone(), record.wrapped.clone())
        };
        if !metadata.status.is_resolvable() {
            return Err(StoreError::KeyNotFound(*id));
        }

        let aad = record_aad(&metadata)?;
        let private = self
            .bounded("unwrap", self.client.unwrap(id, &wrapped, &aad))
            .await?;
        Ok(QuantumKeyPair::new(metadata, PrivateKey::from_bytes(private)))
    }

    async fn list_metadata(&self) -> StoreResult<Vec<KeyMetadata>> {
        let records = self.records.read().await;
        let mut out: Vec<KeyMetadata> = records.values().map(|r| r.metadata.clone()).collect();
        out.sort_by_key(|m| (m.created_at, m.id));
        Ok(out)
    }

    async fn mark_status(
        &self,
        id: &KeyId,
        status: KeyStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<KeyMetadata> {
        let _guard = self.locks.lock(id).await;

        let (old_metadata, wrapped) = {
            let records = self.records.read().await;
            let record = records.get(id).ok_or(StoreError::KeyNotFound(*id))?;
            (record.metadata.clone(), record.wrapped.clone())
        };
        let mut metadata = old_metadata.clone();
        apply_transition(&mut metadata, status, at)?;

        // The wrapped blob is bound to metadata, so a status change re-wraps.
        let old_aad = record_aad(&old_metadata)?;
        let mut private = self
            .bounded("unwrap", self.client.unwrap(id, &wrapped, &old_aad))
            .await?;
        let new_aad = record_aad(&metadata)?;
        let rewrapped = self
            .bounded("wrap", self.client.wrap(id, &private, &new_aad))
            .await;
        private.zeroize();
        let rewrapped = rewrapped?;

        {
            let mut records = self.records.write().await;
            let record = records.get_mut(id).ok_or(StoreError::KeyNotFound(*id))?;
            record.metadata = metadata.clone();
            record.wrapped = rewrapped;
        }
        debug!(key_id = %id, status = %status, "updated key status");
        Ok(metadata)
    }

    async fn secure_delete(&self, id: &KeyId) -> StoreResult<()> {
        let guard = self.locks.lock(id).await;

        if !self.records.read().await.contains_key(id) {
            return Err(StoreError::KeyNotFound(*id));
        }
        self.bounded("destroy", self.client.destroy(id)).await?;
        if let Some(mut record) = self.records.write().await.remove(id) {
            record.wrapped.zeroize();
        }

        drop(guard);
        self.locks.prune();
        debug!(key_id = %id, "destroyed KMS-wrapped key");
        Ok(())
    }
}

/// Software [`KmsClient`] for development and tests.
///
/// Holds a single random wrapping key in process memory; a destroyed key id
/// can no longer be unwrapped.
pub struct LocalKms {
    wrapping_key: SymmetricKey,
    destroyed: RwLock<HashSet<KeyId>>,
}

impl LocalKms {
    pub fn new() -> Self {
        Self {
            wrapping_key: generate_random_key(),
            destroyed: RwLock::new(HashSet::new()),
        }
    }

    fn bound_aad(key_id: &KeyId, aad: &[u8]) -> Vec<u8> {
        let mut out = key_id.as_uuid().as_bytes().to_vec();
        out.extend_from_slice(aad);
        out
    }
}

impl Default for LocalKms {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KmsClient for LocalKms {
    async fn wrap(&self, key_id: &KeyId, plaintext: &[u8], aad: &[u8]) -> StoreResult<Vec<u8>> {
        if self.destroyed.read().await.contains(key_id) {
            return Err(StoreError::Kms(format!("key {key_id} was destroyed")));
        }
        let sealed = encrypt(&self.wrapping_key, plaintext, &Self::bound_aad(key_id, aad))?;
        let mut out = sealed.nonce.to_vec();
        out.extend_from_slice(&sealed.ciphertext);
        Ok(out)
    }

    async fn unwrap(&self, key_id: &KeyId, wrapped: &[u8], aad: &[u8]) -> StoreResult<Vec<u8>> {
        if self.destroyed.read().await.contains(key_id) {
            return Err(StoreError::Kms(format!("key {key_id} was destroyed")));
        }
        if wrapped.len() < NONCE_SIZE {
            return Err(StoreError::Corrupted(*key_id));
        }
        let (nonce, ciphertext) = wrapped.split_at(NONCE_SIZE);
        let mut nonce_arr = [0u8; NONCE_SIZE];
        nonce_arr.copy_from_slice(nonce);
        let data = EncryptedData {
            nonce: nonce_arr,
            ciphertext: ciphertext.to_vec(),
        };
        decrypt(&self.wrapping_key, &data, &Self::bound_aad(key_id, aad)).map_err(|e| match e {
            CryptoError::Decryption => StoreError::Corrupted(*key_id),
            other => StoreError::Crypto(other),
        })
    }

    async fn destroy(&self, key_id: &KeyId) -> StoreResult<()> {
        self.destroyed.write().await.insert(*key_id);
        Ok(())
    }
}
