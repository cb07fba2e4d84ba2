//! Key encapsulation mechanisms.
//!
//! [`KemProvider`] is the pluggable primitive behind key generation,
//! encapsulation and decapsulation. [`MlKemProvider`] implements it for the
//! FIPS 203 ML-KEM parameter sets compiled into this build.
//!
//! ML-KEM decapsulation uses implicit rejection: a well-formed ciphertext that
//! was not produced for the given private key yields a pseudo-random shared
//! secret rather than an error, so callers cannot distinguish "tampered" from
//! "wrong key". Only structurally malformed input (wrong length) is rejected,
//! and length is public information.

use crate::error::{CryptoError, CryptoResult};
use crate::types::{KemAlgorithm, PrivateKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Shared secret produced by encapsulation/decapsulation.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

/// Raw output of key generation.
pub struct KemKeyPair {
    pub public_key: Vec<u8>,
    pub private_key: PrivateKey,
}

/// Output of encapsulation: the ciphertext to transmit and the local secret.
#[derive(Debug)]
pub struct Encapsulation {
    pub ciphertext: Vec<u8>,
    pub shared_secret: SharedSecret,
}

/// Pluggable KEM primitive.
///
/// Implementations must not branch on secret values.
pub trait KemProvider: Send + Sync {
    /// Whether `algorithm` can be used with this provider.
    fn supports(&self, algorithm: KemAlgorithm) -> bool;

    /// Generates a fresh key pair.
    fn keygen(&self, algorithm: KemAlgorithm) -> CryptoResult<KemKeyPair>;

    /// Encapsulates a fresh shared secret against `public_key`.
    fn encapsulate(&self, algorithm: KemAlgorithm, public_key: &[u8])
    -> CryptoResult<Encapsulation>;

    /// Recovers the shared secret for `ciphertext` using `private_key`.
    fn decapsulate(
        &self,
        algorithm: KemAlgorithm,
        ciphertext: &[u8],
        private_key: &PrivateKey,
    ) -> CryptoResult<SharedSecret>;
}

macro_rules! ml_kem_backend {
    ($module:ident) => {
        mod $module {
            use super::{Encapsulation, KemKeyPair, SharedSecret};
            use crate::error::{CryptoError, CryptoResult};
            use crate::types::PrivateKey;
            use pqcrypto_mlkem::$module as kem;
            use pqcrypto_traits::kem::{
                Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
            };

            pub(super) fn keygen() -> KemKeyPair {
                let (pk, sk) = kem::keypair();
                KemKeyPair {
                    public_key: pk.as_bytes().to_vec(),
                    private_key: PrivateKey::from_bytes(sk.as_bytes().to_vec()),
                }
            }

            pub(super) fn encapsulate(public_key: &[u8]) -> CryptoResult<Encapsulation> {
                let pk = kem::PublicKey::from_bytes(public_key).map_err(|_| {
                    CryptoError::KemOperationFailed("malformed public key".to_string())
                })?;
                let (ss, ct) = kem::encapsulate(&pk);
                Ok(Encapsulation {
                    ciphertext: ct.as_bytes().to_vec(),
                    shared_secret: SharedSecret::from_bytes(ss.as_bytes().to_vec()),
                })
            }

            pub(super) fn decapsulate(
                ciphertext: &[u8],
                private_key: &PrivateKey,
            ) -> CryptoResult<SharedSecret> {
                let sk = kem::SecretKey::from_bytes(private_key.as_bytes()).map_err(|_| {
                    CryptoError::KemOperationFailed("malformed private key".to_string())
                })?;
                let ct = kem::Ciphertext::from_bytes(ciphertext).map_err(|_| {
                    CryptoError::KemOperationFailed("malformed ciphertext".to_string())
                })?;
                let ss = kem::decapsulate(&ct, &sk);
                Ok(SharedSecret::from_bytes(ss.as_bytes().to_vec()))
            }
        }
    };
}

#[cfg(feature = "ml-kem-512")]
ml_kem_backend!(mlkem512);
#[cfg(feature = "ml-kem-768")]
ml_kem_backend!(mlkem768);
#[cfg(feature = "ml-kem-1024")]
ml_kem_backend!(mlkem1024);

/// Returns whether `algorithm` was compiled into this build.
pub fn is_compiled_in(algorithm: KemAlgorithm) -> bool {
    match algorithm {
        KemAlgorithm::MlKem512 => cfg!(feature = "ml-kem-512"),
        KemAlgorithm::MlKem768 => cfg!(feature = "ml-kem-768"),
        KemAlgorithm::MlKem1024 => cfg!(feature = "ml-kem-1024"),
    }
}

/// ML-KEM provider backed by `pqcrypto-mlkem`.
#[derive(Debug, Clone)]
pub struct MlKemProvider {
    allowed: Vec<KemAlgorithm>,
}

impl MlKemProvider {
    /// Provider allowing every compiled-in parameter set.
    pub fn new() -> Self {
        Self {
            allowed: KemAlgorithm::ALL
                .into_iter()
                .filter(|alg| is_compiled_in(*alg))
                .collect(),
        }
    }

    /// Provider restricted to an allow-list (still bounded by what is compiled in).
    pub fn with_algorithms(algorithms: &[KemAlgorithm]) -> Self {
        Self {
            allowed: algorithms
                .iter()
                .copied()
                .filter(|alg| is_compiled_in(*alg))
                .collect(),
        }
    }

    pub fn algorithms(&self) -> &[KemAlgorithm] {
        &self.allowed
    }

    fn ensure_supported(&self, algorithm: KemAlgorithm) -> CryptoResult<()> {
        if self.supports(algorithm) {
            Ok(())
        } else {
            Err(CryptoError::UnsupportedAlgorithm(algorithm.to_string()))
        }
    }
}

impl Default for MlKemProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn not_compiled(algorithm: KemAlgorithm) -> CryptoError {
    CryptoError::UnsupportedAlgorithm(algorithm.to_string())
}

impl KemProvider for MlKemProvider {
    fn supports(&self, algorithm: KemAlgorithm) -> bool {
        self.allowed.contains(&algorithm)
    }

    fn keygen(&self, algorithm: KemAlgorithm) -> CryptoResult<KemKeyPair> {
        self.ensure_supported(algorithm)?;
        match algorithm {
            #[cfg(feature = "ml-kem-512")]
            KemAlgorithm::MlKem512 => Ok(mlkem512::keygen()),
            #[cfg(feature = "ml-kem-768")]
            KemAlgorithm::MlKem768 => Ok(mlkem768::keygen()),
            #[cfg(feature = "ml-kem-1024")]
            KemAlgorithm::MlKem1024 => Ok(mlkem1024::keygen()),
            #[allow(unreachable_patterns)]
            other => Err(not_compiled(other)),
        }
    }

    fn encapsulate(
        &self,
        algorithm: KemAlgorithm,
        public_key: &[u8],
    ) -> CryptoResult<Encapsulation> {
        self.ensure_supported(algorithm)?;
        match algorithm {
            #[cfg(feature = "ml-kem-512")]
            KemAlgorithm::MlKem512 => mlkem512::encapsulate(public_key),
            #[cfg(feature = "ml-kem-768")]
            KemAlgorithm::MlKem768 => mlkem768::encapsulate(public_key),
            #[cfg(feature = "ml-kem-1024")]
            KemAlgorithm::MlKem1024 => mlkem1024::encapsulate(public_key),
            #[allow(unreachable_patterns)]
            other => Err(not_compiled(other)),
        }
    }

    fn decapsulate(
        &self,
        algorithm: KemAlgorithm,
        ciphertext: &[u8],
        private_key: &PrivateKey,
    ) -> CryptoResult<SharedSecret> {
        self.ensure_supported(algorithm)?;
        match algorithm {
            #[cfg(feature = "ml-kem-512")]
            KemAlgorithm::MlKem512 => mlkem512::decapsulate(ciphertext, private_key),
            #[cfg(feature = "ml-kem-768")]
            KemAlgorithm::MlKem768 => mlkem768::decapsulate(ciphertext, private_key),
            #[cfg(feature = "ml-kem-1024")]
            KemAlgorithm::MlKem1024 => mlkem1024::decapsulate(ciphertext, private_key),
            #[allow(unreachable_patterns)]
            other => Err(not_compiled(other)),
        }
    }
}
