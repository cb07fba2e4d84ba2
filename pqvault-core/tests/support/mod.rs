//! Shared fixtures for pqvault-core integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pqvault_core::{KeyLifecycleManager, ManualClock, RotationPolicy};
use pqvault_crypto::{
    CryptoError, CryptoResult, Encapsulation, KemAlgorithm, KemKeyPair, KemProvider, KeyId,
    KeyMetadata, KeyStatus, MlKemProvider, PrivateKey, QuantumKeyPair, SharedSecret,
};
use pqvault_keystore::{
    KmsClient, KmsKeyStore, LocalKms, MemoryKeyStore, SecureKeyStore, StoreError, StoreResult,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

pub const ALG: KemAlgorithm = KemAlgorithm::MlKem512;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

pub fn policy(auto_rotate: bool) -> RotationPolicy {
    RotationPolicy {
        auto_rotate,
        algorithm: ALG,
        ..RotationPolicy::default()
    }
}

pub struct Fixture {
    pub manager: KeyLifecycleManager,
    pub clock: ManualClock,
    pub store: Arc<MemoryKeyStore>,
}

pub fn fixture(auto_rotate: bool) -> Fixture {
    fixture_with_provider(Arc::new(MlKemProvider::new()), auto_rotate)
}

pub fn fixture_with_provider(provider: Arc<dyn KemProvider>, auto_rotate: bool) -> Fixture {
    let clock = ManualClock::new(start());
    let store = Arc::new(MemoryKeyStore::new());
    let manager = KeyLifecycleManager::builder(provider, store.clone())
        .policy(policy(auto_rotate))
        .retention(chrono::Duration::days(30))
        .clock(clock.clone())
        .build()
        .unwrap();
    Fixture {
        manager,
        clock,
        store,
    }
}

/// Manager over an arbitrary store, on a manual clock starting at [`start`].
pub fn manager_with_store(
    store: Arc<dyn SecureKeyStore>,
    auto_rotate: bool,
) -> (KeyLifecycleManager, ManualClock) {
    let clock = ManualClock::new(start());
    let manager = KeyLifecycleManager::builder(Arc::new(MlKemProvider::new()), store)
        .policy(policy(auto_rotate))
        .retention(chrono::Duration::days(30))
        .clock(clock.clone())
        .build()
        .unwrap();
    (manager, clock)
}

/// Decrements `counter` if it is non-zero; true when a failure was taken.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn injected() -> StoreError {
    StoreError::Storage("disk unavailable".into())
}

struct MarkFault {
    status: KeyStatus,
    remaining: usize,
    commit: bool,
}

/// In-memory store with switchable status-change and delete failures.
pub struct FailingStore {
    inner: MemoryKeyStore,
    mark_fault: Mutex<Option<MarkFault>>,
    delete_failures: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryKeyStore::new(),
            mark_fault: Mutex::new(None),
            delete_failures: AtomicUsize::new(0),
        }
    }

    /// Rejects the next `times` changes to `status` without applying them.
    pub fn fail_marks_to(&self, status: KeyStatus, times: usize) {
        *self.mark_fault.lock().unwrap() = Some(MarkFault {
            status,
            remaining: times,
            commit: false,
        });
    }

    /// Applies the next change to `status`, then reports a failure anyway.
    pub fn fail_mark_after_commit(&self, status: KeyStatus) {
        *self.mark_fault.lock().unwrap() = Some(MarkFault {
            status,
            remaining: 1,
            commit: true,
        });
    }

    pub fn fail_deletes(&self, times: usize) {
        self.delete_failures.store(times, Ordering::SeqCst);
    }

    /// Returns whether the injected failure commits first, if one applies.
    fn take_mark_fault(&self, status: KeyStatus) -> Option<bool> {
        let mut fault = self.mark_fault.lock().unwrap();
        let armed = fault.as_mut()?;
        if armed.status != status || armed.remaining == 0 {
            return None;
        }
        armed.remaining -= 1;
        Some(armed.commit)
    }
}

#[async_trait]
impl SecureKeyStore for FailingStore {
    async fn store(&self, key: &QuantumKeyPair) -> StoreResult<()> {
        self.inner.store(key).await
    }

    async fn retrieve(&self, id: &KeyId) -> StoreResult<QuantumKeyPair> {
        self.inner.retrieve(id).await
    }

    async fn list_metadata(&self) -> StoreResult<Vec<KeyMetadata>> {
        self.inner.list_metadata().await
    }

    async fn mark_status(
        &self,
        id: &KeyId,
        status: KeyStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<KeyMetadata> {
        match self.take_mark_fault(status) {
            None => self.inner.mark_status(id, status, at).await,
            Some(true) => {
                self.inner.mark_status(id, status, at).await?;
                Err(injected())
            }
            Some(false) => Err(injected()),
        }
    }

    async fn secure_delete(&self, id: &KeyId) -> StoreResult<()> {
        if take_failure(&self.delete_failures) {
            return Err(injected());
        }
        self.inner.secure_delete(id).await
    }
}

/// [`LocalKms`] that fails a chosen `wrap` call and the next few `destroy`s.
#[derive(Default)]
pub struct FlakyKms {
    inner: LocalKms,
    wraps: AtomicUsize,
    /// 1-based index of the wrap call to fail; zero never fails.
    failing_wrap: AtomicUsize,
    destroy_failures: AtomicUsize,
}

impl FlakyKms {
    pub fn fail_wrap_call(&self, n: usize) {
        self.failing_wrap.store(n, Ordering::SeqCst);
    }

    pub fn fail_destroys(&self, times: usize) {
        self.destroy_failures.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl KmsClient for FlakyKms {
    async fn wrap(&self, key_id: &KeyId, plaintext: &[u8], aad: &[u8]) -> StoreResult<Vec<u8>> {
        let call = self.wraps.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.failing_wrap.load(Ordering::SeqCst) {
            return Err(StoreError::Kms("transient".into()));
        }
        self.inner.wrap(key_id, plaintext, aad).await
    }

    async fn unwrap(&self, key_id: &KeyId, wrapped: &[u8], aad: &[u8]) -> StoreResult<Vec<u8>> {
        self.inner.unwrap(key_id, wrapped, aad).await
    }

    async fn destroy(&self, key_id: &KeyId) -> StoreResult<()> {
        if take_failure(&self.destroy_failures) {
            return Err(StoreError::Kms("transient".into()));
        }
        self.inner.destroy(key_id).await
    }
}

/// KMS-backed store over `kms` with a generous timeout.
pub fn kms_store(kms: Arc<FlakyKms>) -> Arc<KmsKeyStore> {
    Arc::new(KmsKeyStore::new(kms, Duration::from_secs(5)))
}

/// ML-KEM provider whose key generation can be switched to fail.
#[derive(Default)]
pub struct FlakyProvider {
    inner: MlKemProvider,
    fail_keygen: AtomicBool,
}

impl FlakyProvider {
    pub fn set_failing(&self, failing: bool) {
        self.fail_keygen.store(failing, Ordering::SeqCst);
    }
}

impl KemProvider for FlakyProvider {
    fn supports(&self, algorithm: KemAlgorithm) -> bool {
        self.inner.supports(algorithm)
    }

    fn keygen(&self, algorithm: KemAlgorithm) -> CryptoResult<KemKeyPair> {
        if self.fail_keygen.load(Ordering::SeqCst) {
            return Err(CryptoError::KemOperationFailed("entropy source unavailable".into()));
        }
        self.inner.keygen(algorithm)
    }

    fn encapsulate(&self, algorithm: KemAlgorithm, public_key: &[u8]) -> CryptoResult<Encapsulation> {
        self.inner.encapsulate(algorithm, public_key)
    }

    fn decapsulate(
        &self,
        algorithm: KemAlgorithm,
        ciphertext: &[u8],
        private_key: &PrivateKey,
    ) -> CryptoResult<SharedSecret> {
        self.inner.decapsulate(algorithm, ciphertext, private_key)
    }
}

/// ML-KEM provider whose key generation blocks while the gate is closed.
pub struct GatedProvider {
    inner: MlKemProvider,
    gate: Mutex<bool>,
    opened: Condvar,
    waiting: AtomicUsize,
}

impl GatedProvider {
    pub fn new() -> Self {
        Self {
            inner: MlKemProvider::new(),
            gate: Mutex::new(true),
            opened: Condvar::new(),
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn close(&self) {
        *self.gate.lock().unwrap() = false;
    }

    pub fn open(&self) {
        *self.gate.lock().unwrap() = true;
        self.opened.notify_all();
    }

    /// Waits (in real time) until `n` keygen calls are parked at the gate.
    pub async fn wait_for_waiters(&self, n: usize) {
        for _ in 0..500 {
            if self.waiting.load(Ordering::SeqCst) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("keygen never reached the gate");
    }
}

impl KemProvider for GatedProvider {
    fn supports(&self, algorithm: KemAlgorithm) -> bool {
        self.inner.supports(algorithm)
    }

    fn keygen(&self, algorithm: KemAlgorithm) -> CryptoResult<KemKeyPair> {
        let mut open = self.gate.lock().unwrap();
        if !*open {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            while !*open {
                open = self.opened.wait(open).unwrap();
            }
            self.waiting.fetch_sub(1, Ordering::SeqCst);
        }
        drop(open);
        self.inner.keygen(algorithm)
    }

    fn encapsulate(&self, algorithm: KemAlgorithm, public_key: &[u8]) -> CryptoResult<Encapsulation> {
        self.inner.encapsulate(algorithm, public_key)
    }

    fn decapsulate(
        &self,
        algorithm: KemAlgorithm,
        ciphertext: &[u8],
        private_key: &PrivateKey,
    ) -> CryptoResult<SharedSecret> {
        self.inner.decapsulate(algorithm, ciphertext, private_key)
    }
}
