//! Per-key-id write serialization.
//!
//! Mutations of one key id run one at a time; distinct ids never contend.

use pqvault_crypto::KeyId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<KeyId, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`.
    pub async fn lock(&self, id: &KeyId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(*id).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Drops lock slots nobody holds or waits on.
    pub fn prune(&self) {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
