//! Vault configuration.
//!
//! [`RotationPolicy`] is the only externally configurable surface of the
//! lifecycle manager; [`VaultConfig`] adds the settings of the surrounding
//! composition root (retention, store timeouts, benchmark parameters).

use crate::error::{VaultError, VaultResult};
use pqvault_crypto::KemAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration as StdDuration;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// When and how the current key is replaced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RotationPolicy {
    /// Lifetime of a newly generated key.
    pub max_age_ms: u64,

    /// Remaining lifetime at which `check_rotation_needed` starts warning.
    pub warning_threshold_ms: u64,

    /// Rotate synchronously when the current key is found expired.
    pub auto_rotate: bool,

    /// Algorithm for keys generated by rotation.
    pub algorithm: KemAlgorithm,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_age_ms: 90 * DAY_MS,
            warning_threshold_ms: 7 * DAY_MS,
            auto_rotate: true,
            algorithm: KemAlgorithm::MlKem768,
        }
    }
}

impl RotationPolicy {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.max_age_ms as i64)
    }

    pub fn warning_threshold(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.warning_threshold_ms as i64)
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.max_age_ms == 0 {
            return Err(VaultError::Config("maxAgeMs must be greater than zero".into()));
        }
        if self.max_age_ms > i64::MAX as u64 {
            return Err(VaultError::Config("maxAgeMs is out of range".into()));
        }
        if self.warning_threshold_ms >= self.max_age_ms {
            return Err(VaultError::Config(
                "warningThresholdMs must be less than maxAgeMs".into(),
            ));
        }
        Ok(())
    }
}

/// Benchmark harness parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BenchmarkConfig {
    pub iterations: u32,
    /// Payload sizes in bytes.
    pub payload_sizes: Vec<usize>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            payload_sizes: vec![64, 1024, 16 * 1024, 256 * 1024],
        }
    }
}

/// Top-level configuration for a vault instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultConfig {
    pub policy: RotationPolicy,

    /// How long an expired key stays available for decryption.
    pub retention_ms: u64,

    /// Upper bound on any single key store round trip (KMS/HSM).
    pub store_timeout_ms: u64,

    pub benchmark: BenchmarkConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            policy: RotationPolicy::default(),
            retention_ms: 30 * DAY_MS,
            store_timeout_ms: 5_000,
            benchmark: BenchmarkConfig::default(),
        }
    }
}

impl VaultConfig {
    pub fn from_json_str(json: &str) -> VaultResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| VaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> VaultResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| VaultError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> VaultResult<()> {
        self.policy.validate()?;
        if self.retention_ms == 0 {
            return Err(VaultError::Config("retentionMs must be greater than zero".into()));
        }
        if self.retention_ms > i64::MAX as u64 {
            return Err(VaultError::Config("retentionMs is out of range".into()));
        }
        if self.store_timeout_ms == 0 {
            return Err(VaultError::Config("storeTimeoutMs must be greater than zero".into()));
        }
        if self.benchmark.iterations == 0 {
            return Err(VaultError::Config("benchmark.iterations must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.retention_ms as i64)
    }

    pub fn store_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.store_timeout_ms)
    }
}
