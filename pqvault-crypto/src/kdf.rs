//! Key-encryption-key derivation from KEM shared secrets.
//!
//! HKDF-SHA256 with the KEM ciphertext as salt and an info string bound to the
//! algorithm and key id. One expansion yields both the KEK and the nonce used
//! to wrap the data key; since every encapsulation produces a fresh shared
//! secret, the (KEK, nonce) pair is never reused.

use crate::cipher::NONCE_SIZE;
use crate::error::{CryptoError, CryptoResult};
use crate::kem::SharedSecret;
use crate::key::{KEY_SIZE, SymmetricKey};
use crate::types::{KemAlgorithm, KeyId};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

const KEK_INFO_PREFIX: &[u8] = b"pqvault/kek/v1";

/// KEK and wrap nonce derived from one shared secret.
pub struct KeyEncryptionKey {
    pub key: SymmetricKey,
    pub nonce: [u8; NONCE_SIZE],
}

/// Derives the key-encryption-key for wrapping a data key.
pub fn derive_kek(
    shared_secret: &SharedSecret,
    kem_ciphertext: &[u8],
    algorithm: KemAlgorithm,
    key_id: &KeyId,
) -> CryptoResult<KeyEncryptionKey> {
    let hk = Hkdf::<Sha256>::new(Some(kem_ciphertext), shared_secret.as_bytes());

    let mut info = Vec::with_capacity(KEK_INFO_PREFIX.len() + 32);
    info.extend_from_slice(KEK_INFO_PREFIX);
    info.push(b'|');
    info.extend_from_slice(algorithm.as_str().as_bytes());
    info.push(b'|');
    info.extend_from_slice(key_id.as_uuid().as_bytes());

    let mut okm = [0u8; KEY_SIZE + NONCE_SIZE];
    hk.expand(&info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(format!("hkdf expand failed: {e}")))?;

    let key = SymmetricKey::from_slice(&okm[..KEY_SIZE])?;
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&okm[KEY_SIZE..]);
    okm.zeroize();

    Ok(KeyEncryptionKey { key, nonce })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let ss = SharedSecret::from_bytes(vec![7u8; 32]);
        let id = KeyId::new();
        let a = derive_kek(&ss, b"ct", KemAlgorithm::MlKem768, &id).unwrap();
        let b = derive_kek(&ss, b"ct", KemAlgorithm::MlKem768, &id).unwrap();
        assert_eq!(a.key.as_bytes(), b.key.as_bytes());
        assert_eq!(a.nonce, b.nonce);
    }

    #[test]
    fn key_id_and_algorithm_are_bound() {
        let ss = SharedSecret::from_bytes(vec![7u8; 32]);
        let id = KeyId::new();
        let base = derive_kek(&ss, b"ct", KemAlgorithm::MlKem768, &id).unwrap();
        let other_id = derive_kek(&ss, b"ct", KemAlgorithm::MlKem768, &KeyId::new()).unwrap();
        let other_alg = derive_kek(&ss, b"ct", KemAlgorithm::MlKem1024, &id).unwrap();
        let other_ct = derive_kek(&ss, b"cu", KemAlgorithm::MlKem768, &id).unwrap();
        assert_ne!(base.key.as_bytes(), other_id.key.as_bytes());
        assert_ne!(base.key.as_bytes(), other_alg.key.as_bytes());
        assert_ne!(base.key.as_bytes(), other_ct.key.as_bytes());
    }
}
