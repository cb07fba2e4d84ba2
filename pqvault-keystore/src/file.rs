//! Encrypted-at-rest key store on the local filesystem.
//!
//! Layout:
//!
//! ```text
//! <dir>/store.json          salt, KDF params, verification token
//! <dir>/keys/<key-id>.json  sealed key record, one per key
//! ```
//!
//! The master key is derived from a passphrase with Argon2id and never
//! written to disk. A verification token (a known plaintext sealed under the
//! master key) lets `open` reject a wrong passphrase before any key is read.

use crate::error::{StoreError, StoreResult};
use crate::locks::KeyLocks;
use crate::record::{SealedKeyRecord, apply_transition};
use crate::SecureKeyStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pqvault_crypto::{
    CryptoError, EncryptedData, KdfParams, KeyId, KeyMetadata, KeyStatus, QuantumKeyPair, Salt,
    SymmetricKey, decrypt, derive_key, encrypt,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const HEADER_FILE: &str = "store.json";
const KEYS_DIR: &str = "keys";
const RECORD_EXT: &str = "json";
const VERIFICATION_PLAINTEXT: &[u8] = b"pqvault-keystore-verification-token-v1";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreHeader {
    version: u32,
    salt: Salt,
    kdf: KdfParams,
    verification: EncryptedData,
}

pub struct FileKeyStore {
    dir: PathBuf,
    master: SymmetricKey,
    locks: KeyLocks,
}

impl FileKeyStore {
    /// Opens the store at `dir`, creating it on first use.
    ///
    /// Fails with `InvalidPassphrase` when `passphrase` does not match the
    /// one the store was created with.
    pub async fn open(
        dir: impl AsRef<Path>,
        passphrase: &str,
        params: KdfParams,
    ) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(KEYS_DIR)).await?;

        let header_path = dir.join(HEADER_FILE);
        let master = if fs::try_exists(&header_path).await? {
            let header: StoreHeader = serde_json::from_slice(&fs::read(&header_path).await?)?;
            let master = derive_master(passphrase, header.salt, header.kdf).await?;
            decrypt(&master, &header.verification, b"").map_err(|e| match e {
                CryptoError::Decryption => StoreError::InvalidPassphrase,
                other => StoreError::Crypto(other),
            })?;
            debug!(dir = %dir.display(), "unlocked file key store");
            master
        } else {
            let salt = Salt::random();
            let master = derive_master(passphrase, salt, params).await?;
            let header = StoreHeader {
                version: 1,
                salt,
                kdf: params,
                verification: encrypt(&master, VERIFICATION_PLAINTEXT, b"")?,
            };
            write_atomic(&header_path, &serde_json::to_vec_pretty(&header)?).await?;
            info!(dir = %dir.display(), "initialized file key store");
            master
        };

        Ok(Self {
            dir,
            master,
            locks: KeyLocks::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &KeyId) -> PathBuf {
        self.dir
            .join(KEYS_DIR)
            .join(format!("{id}.{RECORD_EXT}"))
    }

    async fn read_record(&self, id: &KeyId) -> StoreResult<SealedKeyRecord> {
        let path = self.record_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::KeyNotFound(*id));
            }
            Err(e) => return Err(e.into()),
        };
        let record: SealedKeyRecord =
            serde_json::from_slice(&bytes).map_err(|_| StoreError::Corrupted(*id))?;
        if record.metadata.id != *id {
            return Err(StoreError::Corrupted(*id));
        }
        Ok(record)
    }

    async fn write_record(&self, record: &SealedKeyRecord) -> StoreResult<()> {
        let path = self.record_path(&record.metadata.id);
        write_atomic(&path, &serde_json::to_vec_pretty(record)?).await
    }
}

async fn derive_master(passphrase: &str, salt: Salt, params: KdfParams) -> StoreResult<SymmetricKey> {
    let passphrase = zeroize::Zeroizing::new(passphrase.to_string());
    tokio::task::spawn_blocking(move || derive_key(&passphrase, &salt, &params))
        .await
        .map_err(|e| StoreError::Storage(format!("key derivation task failed: {e}")))?
        .map_err(StoreError::from)
}

/// Writes via a temp file and rename so a crash never leaves a torn record.
async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl SecureKeyStore for FileKeyStore {
    async fn store(&self, key: &QuantumKeyPair) -> StoreResult<()> {
        let id = key.id();
        let _guard = self.locks.lock(&id).await;

        if fs::try_exists(self.record_path(&id)).await? {
            return Err(StoreError::AlreadyExists(id));
        }
        let record = SealedKeyRecord::seal(&self.master, key)?;
        self.write_record(&record).await?;

        debug!(key_id = %id, status = %key.status(), "stored key");
        Ok(())
    }

    async fn retrieve(&self, id: &KeyId) -> StoreResult<QuantumKeyPair> {
        let record = self.read_record(id).await?;
        let key = record.unseal(&self.master)?;
        if !key.status().is_resolvable() {
            return Err(StoreError::KeyNotFound(*id));
        }
        Ok(key)
    }

    async fn list_metadata(&self) -> StoreResult<Vec<KeyMetadata>> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(self.dir.join(KEYS_DIR)).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<KeyId>().ok())
            else {
                warn!(path = %path.display(), "skipping unrecognized file in key store");
                continue;
            };
            match self.read_record(&id).await {
                Ok(record) => out.push(record.verified_metadata(&self.master)?),
                // Deleted between listing and reading.
                Err(StoreError::KeyNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

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

        let record = self.read_record(id).await?;
        let mut metadata = record.verified_metadata(&self.master)?;
        apply_transition(&mut metadata, status, at)?;

        let updated = record.reseal(&self.master, metadata.clone())?;
        self.write_record(&updated).await?;

        debug!(key_id = %id, status = %status, "updated key status");
        Ok(metadata)
    }

    async fn secure_delete(&self, id: &KeyId) -> StoreResult<()> {
        let guard = self.locks.lock(id).await;

        let path = self.record_path(id);
        let len = match fs::metadata(&path).await {
            Ok(meta) => meta.len() as usize,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::KeyNotFound(*id));
            }
            Err(e) => return Err(e.into()),
        };

        // Overwrite in place before unlinking.
        let mut file = fs::OpenOptions::new().write(true).open(&path).await?;
        file.write_all(&vec![0u8; len]).await?;
        file.sync_all().await?;
        drop(file);
        fs::remove_file(&path).await?;

        drop(guard);
        self.locks.prune();
        debug!(key_id = %id, "securely deleted key");
        Ok(())
    }
}
