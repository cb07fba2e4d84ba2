//! In-process key store.
//!
//! Private keys are kept sealed under a random per-store master key, so a
//! heap dump of the record map never shows raw key bytes. Everything is lost
//! when the store is dropped.

use crate::error::{StoreError, StoreResult};
use crate::locks::KeyLocks;
use crate::record::{SealedKeyRecord, apply_transition};
use crate::SecureKeyStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pqvault_crypto::{
    KeyId, KeyMetadata, KeyStatus, QuantumKeyPair, SymmetricKey, generate_random_key,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

pub struct MemoryKeyStore {
    master: SymmetricKey,
    records: RwLock<HashMap<KeyId, SealedKeyRecord>>,
    locks: KeyLocks,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            master: generate_random_key(),
            records: RwLock::new(HashMap::new()),
            locks: KeyLocks::new(),
        }
    }

    /// Number of stored keys, including revoked ones not yet deleted.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureKeyStore for MemoryKeyStore {
    async fn store(&self, key: &QuantumKeyPair) -> StoreResult<()> {
        let id = key.id();
        let _guard = self.locks.lock(&id).await;

        if self.records.read().await.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        let record = SealedKeyRecord::seal(&self.master, key)?;
        self.records.write().await.insert(id, record);

        debug!(key_id = %id, status = %key.status(), "stored key");
        Ok(())
    }

    async fn retrieve(&self, id: &KeyId) -> StoreResult<QuantumKeyPair> {
        let records = self.records.read().await;
        let record = records.get(id).ok_or(StoreError::KeyNotFound(*id))?;
        if !record.metadata.status.is_resolvable() {
            return Err(StoreError::KeyNotFound(*id));
        }
        record.unseal(&self.master)
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

        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or(StoreError::KeyNotFound(*id))?;

        let mut metadata = record.metadata.clone();
        apply_transition(&mut metadata, status, at)?;
        *record = record.reseal(&self.master, metadata.clone())?;

        debug!(key_id = %id, status = %status, "updated key status");
        Ok(metadata)
    }

    async fn secure_delete(&self, id: &KeyId) -> StoreResult<()> {
        let guard = self.locks.lock(id).await;

        let mut removed = self
            .records
            .write()
            .await
            .remove(id)
            .ok_or(StoreError::KeyNotFound(*id))?;
        removed.wipe();

        drop(guard);
        self.locks.prune();
        debug!(key_id = %id, "securely deleted key");
        Ok(())
    }
}
