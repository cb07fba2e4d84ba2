//! Hybrid post-quantum encryption core.
//!
//! - [`KeyLifecycleManager`]: generates, rotates, expires, revokes and purges
//!   ML-KEM keys held in a [`SecureKeyStore`](pqvault_keystore::SecureKeyStore)
//! - [`HybridCipher`]: KEM-wrapped data keys around ChaCha20-Poly1305 payloads
//! - [`BenchmarkHarness`]: isolated latency measurement
//!
//! There is no global manager. The composition root builds one per key
//! domain and hands it to a cipher:
//!
//! ```no_run
//! # async fn demo() -> pqvault_core::VaultResult<()> {
//! use std::sync::Arc;
//! use pqvault_core::{HybridCipher, KeyLifecycleManager, RotationPolicy};
//! use pqvault_crypto::MlKemProvider;
//! use pqvault_keystore::MemoryKeyStore;
//!
//! let manager = KeyLifecycleManager::new(
//!     Arc::new(MlKemProvider::new()),
//!     Arc::new(MemoryKeyStore::new()),
//!     RotationPolicy::default(),
//! )?;
//! manager.initialize().await?;
//!
//! let cipher = HybridCipher::new(manager);
//! let envelope = cipher.encrypt(b"hello world").await?;
//! assert_eq!(cipher.decrypt(&envelope).await?, b"hello world");
//! # Ok(())
//! # }
//! ```

pub mod bench;
pub mod clock;
pub mod config;
pub mod envelope;
mod error;
pub mod hybrid;
pub mod lifecycle;

pub use bench::{BenchmarkHarness, BenchmarkReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BenchmarkConfig, RotationPolicy, VaultConfig};
pub use envelope::HybridEnvelope;
pub use error::{VaultError, VaultResult};
pub use hybrid::HybridCipher;
pub use lifecycle::{KeyLifecycleManager, RotationStatus};

/// Installs the stderr log subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
