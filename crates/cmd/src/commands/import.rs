// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Args;
use diagnostics::*;
use fluxport::sink::{bucket_for_file, read_records};
use fluxport::{Bucket, BucketRecord, InfluxClient, RecordWriter, WriteTarget};

use crate::common::load_config;

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// NDJSON export files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Record category of the files, inferred from the file name by default
    #[arg(short, long)]
    pub bucket: Option<Bucket>,

    /// Destination bucket name (default: the category's configured bucket)
    #[arg(long)]
    pub target: Option<String>,

    /// Read and validate only
    #[arg(long)]
    pub dry_run: bool,
}

/// A file with its decoded records
struct ImportFile {
    path: PathBuf,
    bucket: Bucket,
    records: Vec<BucketRecord>,
}

/// Write exported NDJSON files back into the store
pub async fn import_command(config_path: &Path, args: &ImportArgs) -> Result<()> {
    let config = load_config(config_path)?;

    // Read everything before the first write so a bad file aborts cleanly
    let files = args
        .files
        .iter()
        .map(|path| read_file(path, args.bucket))
        .collect::<Result<Vec<_>>>()?;

    if args.dry_run {
        let mut out = std::io::stdout().lock();
        for file in &files {
            writeln!(
                out,
                "{}: {} {} records",
                file.path.display(),
                file.records.len(),
                file.bucket
            )?;
        }
        return Ok(());
    }

    fluxport::config::validate_store(&config.store)?;
    let client = InfluxClient::new(&config.store).context("Failed to create store client")?;
    let base = config.write_target()?;

    for file in &files {
        let target = WriteTarget {
            bucket: args
                .target
                .clone()
                .unwrap_or_else(|| config.bucket_name(file.bucket)),
            ..base.clone()
        };
        let writer = RecordWriter::new(&client, target);
        let written = writer
            .write_records(&file.records)
            .await
            .with_context(|| format!("Failed to import {}", file.path.display()))?;
        writeln!(
            std::io::stdout().lock(),
            "{}: wrote {} points to {}",
            file.path.display(),
            written,
            writer.target().bucket
        )?;
    }
    Ok(())
}

fn read_file(path: &Path, bucket: Option<Bucket>) -> Result<ImportFile> {
    let bucket = bucket
        .or_else(|| bucket_for_file(path))
        .ok_or_else(|| {
            anyhow!(
                "Cannot tell the record category of {}; pass --bucket",
                path.display()
            )
        })?;
    let records = read_records(bucket, path)?;

    let name = path.display().to_string();
    let count = records.len();
    debug!("Read {count} records from {name}");

    Ok(ImportFile {
        path: path.to_path_buf(),
        bucket,
        records,
    })
}
