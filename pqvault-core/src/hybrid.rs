//! Hybrid KEM + AEAD encryption.
//!
//! Each call to [`HybridCipher::encrypt`] draws a fresh data key and nonce,
//! encrypts the payload with ChaCha20-Poly1305, encapsulates against the
//! current key's ML-KEM public key, derives a KEK from the shared secret and
//! wraps the data key under it. Both the payload and the wrapped data key
//! authenticate the envelope header (algorithm, key id, creation time).

use crate::envelope::{ENVELOPE_VERSION, HybridEnvelope};
use crate::error::{VaultError, VaultResult};
use crate::lifecycle::KeyLifecycleManager;
use chrono::SubsecRound;
use pqvault_crypto::{SymmetricKey, derive_kek, encrypt, generate_random_key, open, seal};
use tracing::debug;
use zeroize::Zeroize;

/// Encrypts and decrypts payloads with the keys of one lifecycle manager.
#[derive(Clone)]
pub struct HybridCipher {
    manager: KeyLifecycleManager,
}

impl HybridCipher {
    pub fn new(manager: KeyLifecycleManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &KeyLifecycleManager {
        &self.manager
    }

    pub async fn encrypt(&self, plaintext: &[u8]) -> VaultResult<HybridEnvelope> {
        let key = self
            .manager
            .get_current_key()
            .await?
            .ok_or(VaultError::NoKeyAvailable)?;

        // Millisecond precision so the timestamp survives the JSON form.
        let created_at = self.manager.now().trunc_subsecs(3);
        let aad = HybridEnvelope::associated_data(key.algorithm, &key.id, created_at);

        let data_key = generate_random_key();
        let payload = encrypt(&data_key, plaintext, &aad)?;

        let encapsulation = self
            .manager
            .provider()
            .encapsulate(key.algorithm, &key.public_key)?;
        let kek = derive_kek(
            &encapsulation.shared_secret,
            &encapsulation.ciphertext,
            key.algorithm,
            &key.id,
        )?;
        let wrapped = seal(&kek.key, &kek.nonce, data_key.as_bytes(), &aad)?;

        let mut encapsulated_key = encapsulation.ciphertext.clone();
        encapsulated_key.extend_from_slice(&wrapped);

        debug!(key_id = %key.id, len = plaintext.len(), "encrypted payload");
        Ok(HybridEnvelope {
            version: ENVELOPE_VERSION,
            algorithm: key.algorithm,
            key_id: key.id,
            nonce: payload.nonce,
            ciphertext: payload.ciphertext,
            encapsulated_key,
            created_at,
        })
    }

    /// Decrypts an envelope.
    ///
    /// Fails with `KeyNotFound` when the key is gone (revoked, purged, or past
    /// retention) and with `DecryptionFailed` for anything else, including
    /// malformed or tampered envelopes.
    pub async fn decrypt(&self, envelope: &HybridEnvelope) -> VaultResult<Vec<u8>> {
        if envelope.version != ENVELOPE_VERSION {
            return Err(VaultError::DecryptionFailed);
        }
        let key = self.manager.resolve_key(&envelope.key_id).await?;
        if key.algorithm() != envelope.algorithm
            || envelope.created_at < key.metadata().created_at.trunc_subsecs(3)
        {
            return Err(VaultError::DecryptionFailed);
        }

        let (kem_ciphertext, wrapped) = envelope.split_encapsulated_key()?;
        let aad = envelope.aad();

        let shared_secret = self
            .manager
            .provider()
            .decapsulate(envelope.algorithm, kem_ciphertext, key.private_key())
            .map_err(|_| VaultError::DecryptionFailed)?;
        let kek = derive_kek(&shared_secret, kem_ciphertext, envelope.algorithm, &envelope.key_id)
            .map_err(|_| VaultError::DecryptionFailed)?;

        let mut raw_key =
            open(&kek.key, &kek.nonce, wrapped, &aad).map_err(|_| VaultError::DecryptionFailed)?;
        let data_key = SymmetricKey::from_slice(&raw_key);
        raw_key.zeroize();
        let data_key = data_key.map_err(|_| VaultError::DecryptionFailed)?;

        let plaintext = open(&data_key, &envelope.nonce, &envelope.ciphertext, &aad)
            .map_err(|_| VaultError::DecryptionFailed)?;

        debug!(key_id = %envelope.key_id, len = plaintext.len(), "decrypted payload");
        Ok(plaintext)
    }

    /// Encrypts a UTF-8 string and returns the envelope as JSON.
    pub async fn encrypt_string(&self, plaintext: &str) -> VaultResult<String> {
        self.encrypt(plaintext.as_bytes()).await?.to_json()
    }

    /// Reverses [`encrypt_string`](Self::encrypt_string).
    pub async fn decrypt_string(&self, envelope_json: &str) -> VaultResult<String> {
        let envelope = HybridEnvelope::from_json(envelope_json)?;
        let plaintext = self.decrypt(&envelope).await?;
        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed)
    }
}
