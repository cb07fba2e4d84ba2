//! Latency measurement for the hybrid scheme.
//!
//! The harness builds its own in-memory store and lifecycle manager with
//! auto-rotation disabled, so running it never rotates or touches the keys
//! of a production manager.

use crate::config::{BenchmarkConfig, RotationPolicy};
use crate::error::{VaultError, VaultResult};
use crate::hybrid::HybridCipher;
use crate::lifecycle::KeyLifecycleManager;
use pqvault_crypto::{KemAlgorithm, KemProvider, generate_nonce, generate_random_key, open, seal};
use pqvault_keystore::MemoryKeyStore;
use rand::RngCore;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const PRIMITIVE_PAYLOAD_SIZE: usize = 1024;

/// Average per-operation latency of the building blocks, in microseconds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveTimings {
    pub keygen_us: f64,
    pub encapsulate_us: f64,
    pub decapsulate_us: f64,
    /// AEAD over a 1 KiB payload.
    pub aead_seal_us: f64,
    pub aead_open_us: f64,
}

/// Average end-to-end latency for one payload size, in microseconds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadTimings {
    pub size_bytes: usize,
    pub encrypt_us: f64,
    pub decrypt_us: f64,
    /// Ciphertext plus encapsulated key, excluding the JSON header.
    pub overhead_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    pub algorithm: KemAlgorithm,
    pub iterations: u32,
    pub primitives: PrimitiveTimings,
    pub payloads: Vec<PayloadTimings>,
}

pub struct BenchmarkHarness {
    provider: Arc<dyn KemProvider>,
    algorithm: KemAlgorithm,
    iterations: u32,
    payload_sizes: Vec<usize>,
}

impl BenchmarkHarness {
    pub fn new(provider: Arc<dyn KemProvider>, algorithm: KemAlgorithm) -> Self {
        Self::from_config(provider, algorithm, &BenchmarkConfig::default())
    }

    pub fn from_config(
        provider: Arc<dyn KemProvider>,
        algorithm: KemAlgorithm,
        config: &BenchmarkConfig,
    ) -> Self {
        Self {
            provider,
            algorithm,
            iterations: config.iterations,
            payload_sizes: config.payload_sizes.clone(),
        }
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn payload_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.payload_sizes = sizes;
        self
    }

    pub async fn run(&self) -> VaultResult<BenchmarkReport> {
        if self.iterations == 0 {
            return Err(VaultError::Config("benchmark iterations must be greater than zero".into()));
        }
        if !self.provider.supports(self.algorithm) {
            return Err(VaultError::UnsupportedAlgorithm(self.algorithm.to_string()));
        }

        let primitives = self.time_primitives()?;

        let policy = RotationPolicy {
            auto_rotate: false,
            algorithm: self.algorithm,
            ..RotationPolicy::default()
        };
        let manager = KeyLifecycleManager::new(
            Arc::clone(&self.provider),
            Arc::new(MemoryKeyStore::new()),
            policy,
        )?;
        manager.generate_key_pair(self.algorithm).await?;
        let cipher = HybridCipher::new(manager);

        let mut payloads = Vec::with_capacity(self.payload_sizes.len());
        for &size in &self.payload_sizes {
            payloads.push(self.time_payload(&cipher, size).await?);
        }

        info!(
            algorithm = %self.algorithm,
            iterations = self.iterations,
            keygen_us = primitives.keygen_us,
            "benchmark complete"
        );
        Ok(BenchmarkReport {
            algorithm: self.algorithm,
            iterations: self.iterations,
            primitives,
            payloads,
        })
    }

    fn time_primitives(&self) -> VaultResult<PrimitiveTimings> {
        let alg = self.algorithm;
        let mut keygen = Duration::ZERO;
        let mut encapsulate = Duration::ZERO;
        let mut decapsulate = Duration::ZERO;
        let mut aead_seal = Duration::ZERO;
        let mut aead_open = Duration::ZERO;
        let payload = random_bytes(PRIMITIVE_PAYLOAD_SIZE);

        for _ in 0..self.iterations {
            let start = Instant::now();
            let pair = self.provider.keygen(alg)?;
            keygen += start.elapsed();

            let start = Instant::now();
            let encapsulation = self.provider.encapsulate(alg, &pair.public_key)?;
            encapsulate += start.elapsed();

            let start = Instant::now();
            self.provider
                .decapsulate(alg, &encapsulation.ciphertext, &pair.private_key)?;
            decapsulate += start.elapsed();

            let key = generate_random_key();
            let nonce = generate_nonce();
            let start = Instant::now();
            let sealed = seal(&key, &nonce, &payload, b"")?;
            aead_seal += start.elapsed();

            let start = Instant::now();
            open(&key, &nonce, &sealed, b"")?;
            aead_open += start.elapsed();
        }

        Ok(PrimitiveTimings {
            keygen_us: average_us(keygen, self.iterations),
            encapsulate_us: average_us(encapsulate, self.iterations),
            decapsulate_us: average_us(decapsulate, self.iterations),
            aead_seal_us: average_us(aead_seal, self.iterations),
            aead_open_us: average_us(aead_open, self.iterations),
        })
    }

    async fn time_payload(&self, cipher: &HybridCipher, size: usize) -> VaultResult<PayloadTimings> {
        let payload = random_bytes(size);
        let mut encrypt_total = Duration::ZERO;
        let mut decrypt_total = Duration::ZERO;
        let mut overhead_bytes = 0;

        for _ in 0..self.iterations {
            let start = Instant::now();
            let envelope = cipher.encrypt(&payload).await?;
            encrypt_total += start.elapsed();

            let start = Instant::now();
            let decrypted = cipher.decrypt(&envelope).await?;
            decrypt_total += start.elapsed();

            if decrypted != payload {
                return Err(VaultError::DecryptionFailed);
            }
            overhead_bytes = envelope.ciphertext.len() + envelope.encapsulated_key.len() - size;
        }

        Ok(PayloadTimings {
            size_bytes: size,
            encrypt_us: average_us(encrypt_total, self.iterations),
            decrypt_us: average_us(decrypt_total, self.iterations),
            overhead_bytes,
        })
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    buf
}

fn average_us(total: Duration, iterations: u32) -> f64 {
    total.as_secs_f64() * 1_000_000.0 / f64::from(iterations)
}
