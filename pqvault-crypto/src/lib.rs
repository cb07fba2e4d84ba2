//! Primitive layer for pqvault.
//!
//! Provides the building blocks of hybrid post-quantum encryption:
//! - ML-KEM (FIPS 203) key encapsulation behind the [`KemProvider`] trait
//! - ChaCha20-Poly1305 for authenticated encryption
//! - HKDF-SHA256 for deriving key-encryption-keys from KEM shared secrets
//! - Argon2id for deriving key-store master keys from passphrases
//! - Key and metadata types with zeroization of private material
//!
//! # Architecture
//!
//! Payloads are never encrypted with KEM output directly. Each message gets:
//!
//! 1. **Data Key**: a random 256-bit key that AEAD-encrypts the payload.
//!
//! 2. **KEK**: derived via HKDF from a fresh KEM shared secret, used only to
//!    wrap the data key.
//!
//! The KEM ciphertext plus the wrapped data key travel with the payload, so
//! only the holder of the KEM private key can recover the data key.

pub mod cipher;
pub mod encoding;
mod error;
pub mod kdf;
pub mod kem;
mod key;
mod types;

pub use cipher::{EncryptedData, NONCE_SIZE, TAG_SIZE, decrypt, encrypt, generate_nonce, open, seal};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{KeyEncryptionKey, derive_kek};
pub use kem::{Encapsulation, KemKeyPair, KemProvider, MlKemProvider, SharedSecret};
pub use key::{KEY_SIZE, KdfParams, SALT_SIZE, Salt, SymmetricKey, derive_key, generate_random_key};
pub use types::{KemAlgorithm, KeyId, KeyMetadata, KeyStatus, PrivateKey, QuantumKeyPair};
