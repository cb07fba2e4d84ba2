//! Key pair, metadata and algorithm types shared across the workspace.

use crate::encoding::base64_bytes;
use crate::error::CryptoError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Post-quantum KEM variants (FIPS 203 parameter sets).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KemAlgorithm {
    #[serde(rename = "ML-KEM-512")]
    MlKem512,
    #[default]
    #[serde(rename = "ML-KEM-768")]
    MlKem768,
    #[serde(rename = "ML-KEM-1024")]
    MlKem1024,
}

impl KemAlgorithm {
    pub const ALL: [KemAlgorithm; 3] = [Self::MlKem512, Self::MlKem768, Self::MlKem1024];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MlKem512 => "ML-KEM-512",
            Self::MlKem768 => "ML-KEM-768",
            Self::MlKem1024 => "ML-KEM-1024",
        }
    }

    pub fn public_key_len(&self) -> usize {
        match self {
            Self::MlKem512 => 800,
            Self::MlKem768 => 1184,
            Self::MlKem1024 => 1568,
        }
    }

    pub fn private_key_len(&self) -> usize {
        match self {
            Self::MlKem512 => 1632,
            Self::MlKem768 => 2400,
            Self::MlKem1024 => 3168,
        }
    }

    /// Length of the encapsulation ciphertext.
    pub fn ciphertext_len(&self) -> usize {
        match self {
            Self::MlKem512 => 768,
            Self::MlKem768 => 1088,
            Self::MlKem1024 => 1568,
        }
    }

    pub fn shared_secret_len(&self) -> usize {
        32
    }
}

impl fmt::Display for KemAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KemAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// Opaque key identifier (UUID v7, so ids sort by creation time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(Uuid);

impl KeyId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for KeyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KeyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a stored key.
///
/// Deletion is not a status: a deleted key simply no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyStatus {
    Active,
    Rotating,
    Expired,
    Revoked,
}

impl KeyStatus {
    /// Returns whether the state machine permits moving from `self` to `next`.
    ///
    /// `Rotating -> Active` is the rollback path of a failed rotation.
    /// `Active -> Expired` is only taken by lazy expiry of an outdated key.
    pub fn can_transition_to(self, next: KeyStatus) -> bool {
        use KeyStatus::*;
        match (self, next) {
            (a, b) if a == b => a != Revoked,
            (Active, Rotating | Expired | Revoked) => true,
            (Rotating, Active | Expired | Revoked) => true,
            (Expired, Revoked) => true,
            _ => false,
        }
    }

    /// Keys in these states can still decrypt previously issued envelopes.
    pub fn is_resolvable(self) -> bool {
        !matches!(self, KeyStatus::Revoked)
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStatus::Active => write!(f, "Active"),
            KeyStatus::Rotating => write!(f, "Rotating"),
            KeyStatus::Expired => write!(f, "Expired"),
            KeyStatus::Revoked => write!(f, "Revoked"),
        }
    }
}

/// Private KEM key bytes. Zeroized on drop, redacted in `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED; {} bytes])", self.0.len())
    }
}

/// Everything about a key pair except its private half.
///
/// This is what application callers and listings see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    pub id: KeyId,
    pub algorithm: KemAlgorithm,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: KeyStatus,
    /// Set when the key leaves `Active`; start of the retention window.
    #[serde(default)]
    pub retired_at: Option<DateTime<Utc>>,
}

impl KeyMetadata {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A KEM key pair together with its lifecycle metadata.
#[derive(Debug, Clone)]
pub struct QuantumKeyPair {
    metadata: KeyMetadata,
    private_key: PrivateKey,
}

impl QuantumKeyPair {
    pub fn new(metadata: KeyMetadata, private_key: PrivateKey) -> Self {
        Self {
            metadata,
            private_key,
        }
    }

    pub fn id(&self) -> KeyId {
        self.metadata.id
    }

    pub fn algorithm(&self) -> KemAlgorithm {
        self.metadata.algorithm
    }

    pub fn public_key(&self) -> &[u8] {
        &self.metadata.public_key
    }

    pub fn status(&self) -> KeyStatus {
        self.metadata.status
    }

    pub fn metadata(&self) -> &KeyMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut KeyMetadata {
        &mut self.metadata
    }

    /// Private key material. Only KEM decapsulation and key stores read this.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}
