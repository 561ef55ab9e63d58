// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fluxport::{Bucket, FluxportConfig, InfluxClient};

use crate::common::load_config;

/// Check the configuration, store health and the configured buckets
pub async fn check_command(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    fluxport::config::validate_store(&config.store)?;

    let client = InfluxClient::new(&config.store).context("Failed to create store client")?;
    let health = client.health().await.context("Store health check failed")?;

    writeln!(
        std::io::stdout().lock(),
        "store {} is {} (version {})",
        client.base_url(),
        health.status,
        health.version.as_deref().unwrap_or("unknown")
    )?;

    let existing = client
        .bucket_names()
        .await
        .context("Failed to list buckets")?;
    let missing = missing_buckets(&config, &existing);
    let mut out = std::io::stdout().lock();
    for bucket in Bucket::ALL {
        let name = config.bucket_name(bucket);
        let state = if missing.contains(&bucket) { "missing" } else { "ok" };
        writeln!(out, "{:<24} {:<24} {}", bucket.key(), name, state)?;
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} configured buckets do not exist", missing.len()))
    }
}

/// Categories whose configured bucket name is not among `existing`
fn missing_buckets(config: &FluxportConfig, existing: &[String]) -> Vec<Bucket> {
    Bucket::ALL
        .into_iter()
        .filter(|b| {
            let name = config.bucket_name(*b);
            !existing.iter().any(|e| *e == name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_buckets_uses_configured_names() {
        let mut config = FluxportConfig::default();
        _ = config
            .export
            .buckets
            .insert(Bucket::Costs, "billing".to_string());

        let existing = vec![
            "system_metrics".to_string(),
            "sensor_data".to_string(),
            "costs".to_string(),
        ];
        assert_eq!(
            missing_buckets(&config, &existing),
            vec![Bucket::SensorDataAggregated, Bucket::Costs]
        );
    }
}
