//! Confidential, integrity-protected storage for KEM key pairs.
//!
//! [`SecureKeyStore`] is the only place private key material rests. Three
//! implementations share the same contract:
//! - [`MemoryKeyStore`]: in-process, sealed under a random master key (tests, dev)
//! - [`FileKeyStore`]: encrypted-at-rest directory unlocked by a passphrase
//! - [`KmsKeyStore`]: private keys wrapped by an external KMS/HSM, every
//!   round trip bounded by a timeout
//!
//! Mutations of one key id are serialized; distinct ids proceed independently.
//! Revoked and deleted keys never resolve.

pub mod error;
pub mod file;
pub mod kms;
pub mod locks;
pub mod memory;
mod record;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pqvault_crypto::{KeyId, KeyMetadata, KeyStatus, QuantumKeyPair};

pub use error::{StoreError, StoreResult};
pub use file::FileKeyStore;
pub use kms::{KmsClient, KmsKeyStore, LocalKms};
pub use memory::MemoryKeyStore;

/// Storage contract for key pairs and their lifecycle metadata.
#[async_trait]
pub trait SecureKeyStore: Send + Sync {
    /// Persists a new key pair. Fails with `AlreadyExists` for a known id.
    async fn store(&self, key: &QuantumKeyPair) -> StoreResult<()>;

    /// Loads a key pair. Revoked or deleted keys fail with `KeyNotFound`.
    async fn retrieve(&self, id: &KeyId) -> StoreResult<QuantumKeyPair>;

    /// Lists metadata of every stored key, without private material.
    async fn list_metadata(&self) -> StoreResult<Vec<KeyMetadata>>;

    /// Moves a key to `status`, stamped with the transition time.
    async fn mark_status(
        &self,
        id: &KeyId,
        status: KeyStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<KeyMetadata>;

    /// Destroys a key's material irrecoverably.
    async fn secure_delete(&self, id: &KeyId) -> StoreResult<()>;
}
