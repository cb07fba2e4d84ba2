//! Prints a latency report for the hybrid scheme as JSON.
//!
//! Usage: `pqvault-bench [config.json]`

use anyhow::Context;
use pqvault_core::{BenchmarkHarness, VaultConfig, init_logging};
use pqvault_crypto::MlKemProvider;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => VaultConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => VaultConfig::default(),
    };

    let provider = Arc::new(MlKemProvider::new());
    let report = BenchmarkHarness::from_config(provider, config.policy.algorithm, &config.benchmark)
        .run()
        .await
        .context("benchmark failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
