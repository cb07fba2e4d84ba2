//! Key lifecycle management.
//!
//! [`KeyLifecycleManager`] owns the "current key" pointer and every status
//! change a key goes through:
//!
//! ```text
//! Active -> Rotating -> Expired -> (retention window) -> deleted
//!    ^         |
//!    +---------+  failed rotation rolls back
//!
//! any non-deleted state -> Revoked -> deleted immediately
//! ```
//!
//! Rotation is the only serialized critical section. It runs on a detached
//! task holding the rotation lock, so a caller dropping its future cannot
//! leave the store half-swapped. Encryption and decryption only take read
//! locks and never wait on a rotation unless the current key is expired.

use crate::clock::{Clock, SystemClock};
use crate::config::{RotationPolicy, VaultConfig};
use crate::error::{VaultError, VaultResult};
use chrono::{DateTime, Duration, Utc};
use pqvault_crypto::{
    KemAlgorithm, KemProvider, KeyId, KeyMetadata, KeyStatus, QuantumKeyPair,
};
use pqvault_keystore::SecureKeyStore;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

/// Result of [`KeyLifecycleManager::check_rotation_needed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationStatus {
    /// No usable Active key, or the current key has reached `expires_at`.
    pub needs_rotation: bool,
    /// The current key is within the policy's warning threshold (or absent).
    pub warning_state: bool,
    /// Remaining lifetime of the current key, clamped at zero.
    pub time_until_expiry: Option<Duration>,
}

struct Inner {
    provider: Arc<dyn KemProvider>,
    store: Arc<dyn SecureKeyStore>,
    clock: Arc<dyn Clock>,
    policy: RwLock<RotationPolicy>,
    retention: Duration,
    current: RwLock<Option<KeyMetadata>>,
    rotation: Arc<Mutex<()>>,
}

/// Manages key generation, rotation, expiry, revocation and retention.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct KeyLifecycleManager {
    inner: Arc<Inner>,
}

pub struct KeyLifecycleManagerBuilder {
    provider: Arc<dyn KemProvider>,
    store: Arc<dyn SecureKeyStore>,
    clock: Arc<dyn Clock>,
    policy: RotationPolicy,
    retention: Duration,
}

impl KeyLifecycleManagerBuilder {
    pub fn policy(mut self, policy: RotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Applies the policy and retention window from a loaded config.
    pub fn config(self, config: &VaultConfig) -> Self {
        let retention = config.retention();
        self.policy(config.policy.clone()).retention(retention)
    }

    pub fn build(self) -> VaultResult<KeyLifecycleManager> {
        self.policy.validate()?;
        if self.retention <= Duration::zero() {
            return Err(VaultError::Config("retention must be positive".into()));
        }
        if !self.provider.supports(self.policy.algorithm) {
            return Err(VaultError::UnsupportedAlgorithm(
                self.policy.algorithm.to_string(),
            ));
        }

        Ok(KeyLifecycleManager {
            inner: Arc::new(Inner {
                provider: self.provider,
                store: self.store,
                clock: self.clock,
                policy: RwLock::new(self.policy),
                retention: self.retention,
                current: RwLock::new(None),
                rotation: Arc::new(Mutex::new(())),
            }),
        })
    }
}

impl KeyLifecycleManager {
    pub fn builder(
        provider: Arc<dyn KemProvider>,
        store: Arc<dyn SecureKeyStore>,
    ) -> KeyLifecycleManagerBuilder {
        KeyLifecycleManagerBuilder {
            provider,
            store,
            clock: Arc::new(SystemClock),
            policy: RotationPolicy::default(),
            retention: VaultConfig::default().retention(),
        }
    }

    /// Manager with the system clock and default retention.
    pub fn new(
        provider: Arc<dyn KemProvider>,
        store: Arc<dyn SecureKeyStore>,
        policy: RotationPolicy,
    ) -> VaultResult<Self> {
        Self::builder(provider, store).policy(policy).build()
    }

    /// Restores the current key pointer from the store.
    ///
    /// If several keys are `Active` the newest wins and the rest are demoted
    /// to `Expired`. A key left `Rotating` by an interrupted rotation is put
    /// back to `Active` when no other key is, otherwise it is expired.
    pub async fn initialize(&self) -> VaultResult<Option<KeyMetadata>> {
        let _guard = self.inner.rotation.lock().await;
        let now = self.inner.clock.now();
        let keys = self.inner.store.list_metadata().await?;

        // list_metadata is ordered oldest first
        let mut active: Vec<&KeyMetadata> =
            keys.iter().filter(|m| m.status == KeyStatus::Active).collect();
        let mut rotating: Vec<&KeyMetadata> =
            keys.iter().filter(|m| m.status == KeyStatus::Rotating).collect();

        let current = match active.pop() {
            Some(newest) => Some(newest.clone()),
            None => match rotating.pop() {
                Some(interrupted) => {
                    let restored = self
                        .inner
                        .store
                        .mark_status(&interrupted.id, KeyStatus::Active, now)
                        .await?;
                    warn!(key_id = %restored.id, "restored key left mid-rotation");
                    Some(restored)
                }
                None => None,
            },
        };

        for stale in active.into_iter().chain(rotating) {
            self.inner
                .store
                .mark_status(&stale.id, KeyStatus::Expired, now)
                .await?;
            warn!(key_id = %stale.id, status = %stale.status, "demoted superseded key");
        }

        *self.inner.current.write().await = current.clone();
        match &current {
            Some(key) => info!(key_id = %key.id, algorithm = %key.algorithm, "key manager initialized"),
            None => info!("key manager initialized without a current key"),
        }
        Ok(current)
    }

    /// Generates a key of `algorithm` and installs it as current.
    ///
    /// The previous current key, if any, is retired exactly as in
    /// [`rotate_keys`](Self::rotate_keys).
    pub async fn generate_key_pair(&self, algorithm: KemAlgorithm) -> VaultResult<KeyMetadata> {
        if !self.inner.provider.supports(algorithm) {
            return Err(VaultError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        let guard = self.try_rotation_lock()?;
        self.run_rotation(guard, algorithm).await
    }

    /// Returns the current key, handling expiry.
    ///
    /// An expired key is never returned. Without auto-rotation it is marked
    /// `Expired` and `None` is returned; with auto-rotation a replacement is
    /// generated first, and concurrent callers wait for that one rotation.
    pub async fn get_current_key(&self) -> VaultResult<Option<KeyMetadata>> {
        let now = self.inner.clock.now();
        let auto_rotate = self.inner.policy.read().await.auto_rotate;
        {
            let current = self.inner.current.read().await;
            match current.as_ref() {
                Some(key) if !key.is_expired_at(now) => return Ok(Some(key.clone())),
                None if !auto_rotate => return Ok(None),
                _ => {}
            }
        }

        let guard = self.inner.rotation.clone().lock_owned().await;
        let now = self.inner.clock.now();
        let current = self.inner.current.read().await.clone();
        if current.as_ref().is_some_and(|key| !key.is_expired_at(now)) {
            // Another caller rotated while we waited.
            return Ok(current);
        }

        let policy = self.policy().await;
        if policy.auto_rotate {
            match self.run_rotation(guard, policy.algorithm).await {
                Ok(key) => Ok(Some(key)),
                Err(e) => {
                    warn!(error = %e, "automatic key rotation failed");
                    Ok(None)
                }
            }
        } else {
            if let Some(expired) = current {
                self.inner
                    .store
                    .mark_status(&expired.id, KeyStatus::Expired, now)
                    .await?;
                *self.inner.current.write().await = None;
                warn!(key_id = %expired.id, "current key expired; rotation required");
            }
            Ok(None)
        }
    }

    pub async fn check_rotation_needed(&self) -> RotationStatus {
        let now = self.inner.clock.now();
        let threshold = self.inner.policy.read().await.warning_threshold();

        match self.inner.current.read().await.as_ref() {
            None => RotationStatus {
                needs_rotation: true,
                warning_state: true,
                time_until_expiry: None,
            },
            Some(key) => {
                let remaining = key.expires_at - now;
                RotationStatus {
                    needs_rotation: key.is_expired_at(now),
                    warning_state: remaining <= threshold,
                    time_until_expiry: Some(remaining.max(Duration::zero())),
                }
            }
        }
    }

    /// Replaces the current key with a freshly generated one.
    ///
    /// Fails with `RotationInProgress` if another rotation holds the lock.
    /// On any other failure the previous key stays `Active` and current.
    pub async fn rotate_keys(&self) -> VaultResult<KeyMetadata> {
        let guard = self.try_rotation_lock()?;
        let algorithm = self.inner.policy.read().await.algorithm;

        self.run_rotation(guard, algorithm).await.map_err(|e| match e {
            VaultError::RotationFailed(_) => e,
            other => VaultError::RotationFailed(other.to_string()),
        })
    }

    /// Revokes a compromised key and destroys it immediately.
    ///
    /// Envelopes under the key become undecryptable. If it was current, the
    /// manager is left without a current key. Revoking a key whose earlier
    /// destruction failed retries the destruction.
    pub async fn revoke_key(&self, id: &KeyId) -> VaultResult<()> {
        let _guard = self.inner.rotation.lock().await;
        let now = self.inner.clock.now();

        let stored = self
            .stored_metadata(id)
            .await?
            .ok_or(VaultError::KeyNotFound(*id))?;
        if stored.status != KeyStatus::Revoked {
            self.inner
                .store
                .mark_status(id, KeyStatus::Revoked, now)
                .await?;
        }
        {
            let mut current = self.inner.current.write().await;
            if current.as_ref().is_some_and(|key| key.id == *id) {
                *current = None;
            }
        }
        self.inner.store.secure_delete(id).await?;

        warn!(key_id = %id, "key revoked and destroyed");
        Ok(())
    }

    /// Destroys expired keys whose retention window has elapsed.
    ///
    /// Revoked keys still present because their destruction failed are
    /// destroyed as well.
    pub async fn purge_expired(&self) -> VaultResult<Vec<KeyId>> {
        self.purge_expired_unless(|_| false).await
    }

    /// Like [`purge_expired`](Self::purge_expired), but keeps keys for which
    /// `still_referenced` returns true.
    pub async fn purge_expired_unless<F>(&self, still_referenced: F) -> VaultResult<Vec<KeyId>>
    where
        F: Fn(&KeyMetadata) -> bool,
    {
        let now = self.inner.clock.now();
        let current = self.current_id().await;
        let mut purged = Vec::new();

        for key in self.inner.store.list_metadata().await? {
            if key.status == KeyStatus::Revoked {
                self.inner.store.secure_delete(&key.id).await?;
                warn!(key_id = %key.id, "destroyed leftover revoked key");
                purged.push(key.id);
                continue;
            }
            if !self.retention_elapsed(&key, current, now) {
                continue;
            }
            if still_referenced(&key) {
                debug!(key_id = %key.id, "retention elapsed but key still referenced");
                continue;
            }
            self.inner.store.secure_delete(&key.id).await?;
            info!(key_id = %key.id, "purged expired key");
            purged.push(key.id);
        }
        Ok(purged)
    }

    /// Replaces the rotation policy. Existing keys keep their `expires_at`.
    pub async fn update_policy(&self, policy: RotationPolicy) -> VaultResult<()> {
        policy.validate()?;
        if !self.inner.provider.supports(policy.algorithm) {
            return Err(VaultError::UnsupportedAlgorithm(policy.algorithm.to_string()));
        }
        info!(
            max_age_ms = policy.max_age_ms,
            auto_rotate = policy.auto_rotate,
            algorithm = %policy.algorithm,
            "rotation policy updated"
        );
        *self.inner.policy.write().await = policy;
        Ok(())
    }

    pub async fn policy(&self) -> RotationPolicy {
        self.inner.policy.read().await.clone()
    }

    pub fn retention(&self) -> Duration {
        self.inner.retention
    }

    pub async fn list_keys(&self) -> VaultResult<Vec<KeyMetadata>> {
        Ok(self.inner.store.list_metadata().await?)
    }

    /// Loads a key for decryption.
    ///
    /// Revoked, deleted, and expired keys past retention are all `KeyNotFound`.
    pub(crate) async fn resolve_key(&self, id: &KeyId) -> VaultResult<QuantumKeyPair> {
        let key = self.inner.store.retrieve(id).await?;
        let current = self.current_id().await;
        if self.retention_elapsed(key.metadata(), current, self.inner.clock.now()) {
            return Err(VaultError::KeyNotFound(*id));
        }
        Ok(key)
    }

    pub(crate) fn provider(&self) -> &Arc<dyn KemProvider> {
        &self.inner.provider
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    async fn current_id(&self) -> Option<KeyId> {
        self.inner.current.read().await.as_ref().map(|key| key.id)
    }

    async fn stored_metadata(&self, id: &KeyId) -> VaultResult<Option<KeyMetadata>> {
        Ok(self
            .inner
            .store
            .list_metadata()
            .await?
            .into_iter()
            .find(|key| key.id == *id))
    }

    /// A `Rotating` key that is no longer current missed its final `Expired`
    /// mark and ages out like an expired one.
    fn retention_elapsed(
        &self,
        key: &KeyMetadata,
        current: Option<KeyId>,
        now: DateTime<Utc>,
    ) -> bool {
        let retired = match key.status {
            KeyStatus::Expired => true,
            KeyStatus::Rotating => current != Some(key.id),
            _ => false,
        };
        if !retired {
            return false;
        }
        let retired = key.retired_at.unwrap_or(key.expires_at);
        now >= retired + self.inner.retention
    }

    fn try_rotation_lock(&self) -> VaultResult<OwnedMutexGuard<()>> {
        self.inner
            .rotation
            .clone()
            .try_lock_owned()
            .map_err(|_| VaultError::RotationInProgress)
    }

    /// Runs the swap on a detached task that owns the rotation lock.
    async fn run_rotation(
        &self,
        guard: OwnedMutexGuard<()>,
        algorithm: KemAlgorithm,
    ) -> VaultResult<KeyMetadata> {
        let manager = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            manager.rotate_locked(algorithm).await
        })
        .await
        .map_err(|e| VaultError::RotationFailed(format!("rotation task aborted: {e}")))?
    }

    async fn rotate_locked(&self, algorithm: KemAlgorithm) -> VaultResult<KeyMetadata> {
        let now = self.inner.clock.now();
        let previous = self.inner.current.read().await.clone();

        if let Some(old) = &previous {
            if let Err(e) = self
                .inner
                .store
                .mark_status(&old.id, KeyStatus::Rotating, now)
                .await
            {
                // The store may have applied the change before failing.
                self.restore_if_rotating(old).await;
                error!(key_id = %old.id, error = %e, "could not begin key rotation");
                return Err(e.into());
            }
        }

        let candidate = match self.create_key(algorithm, now).await {
            Ok(candidate) => candidate,
            Err(e) => {
                if let Some(old) = &previous {
                    self.roll_back(old).await;
                }
                error!(error = %e, "key rotation failed; previous key kept");
                return Err(e);
            }
        };

        *self.inner.current.write().await = Some(candidate.clone());

        if let Some(old) = &previous {
            // The swap already happened. A leftover Rotating record ages out
            // like an expired one and is demoted by the next initialize().
            if let Err(e) = self
                .inner
                .store
                .mark_status(&old.id, KeyStatus::Expired, now)
                .await
            {
                warn!(key_id = %old.id, error = %e, "failed to expire rotated-out key");
            }
        }

        info!(
            key_id = %candidate.id,
            previous = ?previous.as_ref().map(|k| k.id.to_string()),
            algorithm = %algorithm,
            expires_at = %candidate.expires_at,
            "key rotated"
        );
        Ok(candidate)
    }

    async fn restore_if_rotating(&self, old: &KeyMetadata) {
        match self.stored_metadata(&old.id).await {
            Ok(Some(stored)) if stored.status == KeyStatus::Rotating => self.roll_back(old).await,
            Ok(_) => {}
            Err(e) => error!(key_id = %old.id, error = %e, "cannot read key state after failed rotation"),
        }
    }

    async fn roll_back(&self, old: &KeyMetadata) {
        let now = self.inner.clock.now();
        match self
            .inner
            .store
            .mark_status(&old.id, KeyStatus::Active, now)
            .await
        {
            Ok(restored) => *self.inner.current.write().await = Some(restored),
            Err(e) => error!(key_id = %old.id, error = %e, "failed to restore key after rotation failure"),
        }
    }

    async fn create_key(
        &self,
        algorithm: KemAlgorithm,
        now: DateTime<Utc>,
    ) -> VaultResult<KeyMetadata> {
        let provider = Arc::clone(&self.inner.provider);
        let pair = tokio::task::spawn_blocking(move || provider.keygen(algorithm))
            .await
            .map_err(|e| VaultError::RotationFailed(format!("key generation task failed: {e}")))??;

        let max_age = self.inner.policy.read().await.max_age();
        let metadata = KeyMetadata {
            id: KeyId::new(),
            algorithm,
            public_key: pair.public_key,
            created_at: now,
            expires_at: now + max_age,
            status: KeyStatus::Active,
            retired_at: None,
        };
        let key = QuantumKeyPair::new(metadata.clone(), pair.private_key);
        self.inner.store.store(&key).await?;

        debug!(key_id = %metadata.id, algorithm = %algorithm, "generated key pair");
        Ok(metadata)
    }
}
