// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Export pipeline
//!
//! One export is a single pass: check the configuration, resolve the time
//! window, let the bucket's [`BucketExport`] strategy render the query, run
//! it, decode every row and drop the ones that do not make a valid record.
//! [`Exporter`] runs several buckets in sequence and writes each result to
//! an NDJSON file; a failing bucket is logged and skipped.

pub mod aggregated;
pub mod costs;
pub mod sensor;
pub mod system;

pub use aggregated::AggregatedSensorExport;
pub use costs::CostExport;
pub use sensor::SensorExport;
pub use system::SystemMetricsExport;

use crate::bucket::Bucket;
use crate::client::TimeSeriesStore;
use crate::config::{FluxportConfig, validate_export};
use crate::decode;
use crate::error::{Error, Result};
use crate::query::{DEFAULT_LOOKBACK_HOURS, QueryBuilder};
use crate::record::RecordShape;
use crate::row::FluxRecord;
use crate::sink::{ExportedFile, NdjsonSink};
use chrono::{DateTime, TimeDelta, Utc};
use diagnostics::*;
use serde::Serialize;

/// Requested export window; missing bounds are filled in by [`ExportWindow::resolve`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Concrete `[start, end)` bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExportWindow {
    #[must_use]
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// The last `lookback` up to now
    pub fn last(lookback: TimeDelta) -> Result<Self> {
        Self::last_before(Utc::now(), lookback)
    }

    /// The `lookback` ending at `end`
    pub fn last_before(end: DateTime<Utc>, lookback: TimeDelta) -> Result<Self> {
        let start = end.checked_sub_signed(lookback).ok_or_else(|| {
            Error::invalid_argument(format!("lookback {lookback} before {end} is out of range"))
        })?;
        Ok(Self {
            start: Some(start),
            end: Some(end),
        })
    }

    /// Given bounds are used verbatim; missing ones default to the 24 hours before `now`
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<ResolvedWindow> {
        let start = match self.start {
            Some(start) => start,
            None => now
                .checked_sub_signed(TimeDelta::hours(DEFAULT_LOOKBACK_HOURS))
                .ok_or_else(|| Error::invalid_argument("default export window is out of range"))?,
        };
        let end = self.end.unwrap_or(now);
        if start >= end {
            return Err(Error::invalid_argument(format!(
                "export window start {start} is not before end {end}"
            )));
        }
        Ok(ResolvedWindow { start, end })
    }
}

/// Per-bucket export strategy
pub trait BucketExport: Send + Sync {
    type Record: RecordShape + Serialize + Send;

    fn category(&self) -> Bucket;

    /// Store bucket queried by this strategy
    fn bucket_name(&self) -> &str;

    /// Decode one row; the caller checks the result with [`decode::is_valid`]
    fn decode(&self, row: &FluxRecord) -> Option<Self::Record>;

    /// Builder preset with the bucket and window, for further composition
    fn query(&self, window: &ResolvedWindow) -> Result<QueryBuilder> {
        QueryBuilder::from_bucket(self.bucket_name())?.range(window.start, window.end)
    }

    /// Query text of a plain export of the window
    fn build_query(&self, window: &ResolvedWindow) -> Result<String> {
        Ok(self.query(window)?.build())
    }
}

/// Export one bucket over `window`
pub async fn export_bucket<E: BucketExport>(
    store: &dyn TimeSeriesStore,
    config: &FluxportConfig,
    strategy: &E,
    window: &ExportWindow,
) -> Result<Vec<E::Record>> {
    validate_export(config)?;
    let resolved = window.resolve(Utc::now())?;
    export_resolved(store, config, strategy, &resolved).await
}

/// Export one bucket over an already resolved window
pub async fn export_resolved<E: BucketExport>(
    store: &dyn TimeSeriesStore,
    config: &FluxportConfig,
    strategy: &E,
    window: &ResolvedWindow,
) -> Result<Vec<E::Record>> {
    validate_export(config)?;
    let query = strategy.build_query(window)?;
    execute(store, strategy, &query).await
}

/// Run an already built query through a strategy's decoder
pub async fn run_query<E: BucketExport>(
    store: &dyn TimeSeriesStore,
    config: &FluxportConfig,
    strategy: &E,
    query: &str,
) -> Result<Vec<E::Record>> {
    validate_export(config)?;
    execute(store, strategy, query).await
}

async fn execute<E: BucketExport>(
    store: &dyn TimeSeriesStore,
    strategy: &E,
    query: &str,
) -> Result<Vec<E::Record>> {
    let bucket = strategy.bucket_name();
    debug!("Export query for {bucket}: {query}");

    let rows = store
        .query(query)
        .await
        .map_err(|e| Error::export_failure(bucket, e))?;

    let total = rows.len();
    let records: Vec<E::Record> = rows
        .iter()
        .filter_map(|row| strategy.decode(row))
        .filter(|record| decode::is_valid(record))
        .collect();

    let dropped = total - records.len();
    if dropped > 0 {
        debug!("Dropped {dropped} of {total} rows from {bucket} that did not decode");
    }
    Ok(records)
}

/// Multi-bucket export into NDJSON files
pub struct Exporter<'a> {
    store: &'a dyn TimeSeriesStore,
    config: &'a FluxportConfig,
    sink: NdjsonSink,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub fn new(store: &'a dyn TimeSeriesStore, config: &'a FluxportConfig) -> Self {
        Self {
            store,
            config,
            sink: NdjsonSink::new(config.export.output_folder.clone()),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: NdjsonSink) -> Self {
        self.sink = sink;
        self
    }

    /// Export every bucket category
    pub async fn export_all(&self, window: &ExportWindow) -> Result<Vec<ExportedFile>> {
        self.export_selected(&Bucket::ALL, window).await
    }

    /// Export `buckets` in order, each category once, over one resolved
    /// window. Configuration and window problems fail the whole call; any
    /// other failure only skips its bucket.
    pub async fn export_selected(
        &self,
        buckets: &[Bucket],
        window: &ExportWindow,
    ) -> Result<Vec<ExportedFile>> {
        validate_export(self.config)?;
        let resolved = window.resolve(Utc::now())?;

        let mut unique: Vec<Bucket> = Vec::with_capacity(buckets.len());
        for &bucket in buckets {
            if !unique.contains(&bucket) {
                unique.push(bucket);
            }
        }

        let requested = unique.len();
        info!("Exporting {requested} buckets");

        let mut files = Vec::with_capacity(requested);
        for bucket in unique {
            match self.export_window(bucket, &resolved).await {
                Ok(file) => files.push(file),
                Err(err) => {
                    let name = bucket.key();
                    warn!("Skipping bucket {name}: {err}", err: err.to_string().as_str());
                }
            }
        }

        let produced = files.len();
        info!("Export finished: {produced} of {requested} buckets written");
        Ok(files)
    }

    /// Export one bucket category to a file
    pub async fn export_one(&self, bucket: Bucket, window: &ExportWindow) -> Result<ExportedFile> {
        validate_export(self.config)?;
        let resolved = window.resolve(Utc::now())?;
        self.export_window(bucket, &resolved).await
    }

    async fn export_window(&self, bucket: Bucket, window: &ResolvedWindow) -> Result<ExportedFile> {
        match bucket {
            Bucket::SystemMetrics => {
                self.export_with(&SystemMetricsExport::from_config(self.config), window)
                    .await
            }
            Bucket::SensorData => {
                self.export_with(&SensorExport::from_config(self.config), window)
                    .await
            }
            Bucket::SensorDataAggregated => {
                self.export_with(&AggregatedSensorExport::from_config(self.config), window)
                    .await
            }
            Bucket::Costs => {
                self.export_with(&CostExport::from_config(self.config), window)
                    .await
            }
        }
    }

    async fn export_with<E: BucketExport>(
        &self,
        strategy: &E,
        window: &ResolvedWindow,
    ) -> Result<ExportedFile> {
        let records = export_resolved(self.store, self.config, strategy, window).await?;
        self.sink.write(strategy.category(), &records)
    }
}
