// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Args;
use fluxport::{Bucket, Exporter, InfluxClient};

use crate::common::{WindowArgs, load_config};

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Bucket categories to export (default: all)
    pub buckets: Vec<Bucket>,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Output folder, overriding export.output_folder
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Export buckets to NDJSON files; a failing bucket is reported and skipped
pub async fn export_command(config_path: &Path, args: &ExportArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(output) = &args.output {
        config.export.output_folder = output.clone();
    }
    let window = args.window.window()?;

    let mut buckets: Vec<Bucket> = Vec::new();
    let requested = if args.buckets.is_empty() {
        &Bucket::ALL[..]
    } else {
        &args.buckets[..]
    };
    for bucket in requested {
        if !buckets.contains(bucket) {
            buckets.push(*bucket);
        }
    }

    let client = InfluxClient::new(&config.store).context("Failed to create store client")?;
    let exporter = Exporter::new(&client, &config);
    let files = exporter
        .export_selected(&buckets, &window)
        .await
        .context("Export failed")?;

    let mut out = std::io::stdout().lock();
    for file in &files {
        writeln!(
            out,
            "{:<24} {:>8} records  {}",
            file.bucket.key(),
            file.records,
            file.path.display()
        )?;
    }

    if files.is_empty() {
        return Err(anyhow!("No bucket could be exported"));
    }
    if files.len() < buckets.len() {
        writeln!(
            out,
            "{} of {} buckets failed; set FLUXPORT_LOG=warn for details",
            buckets.len() - files.len(),
            buckets.len()
        )?;
    }
    Ok(())
}
