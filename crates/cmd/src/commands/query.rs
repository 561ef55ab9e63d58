// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use diagnostics::*;
use fluxport::export::{AggregatedSensorExport, CostExport, SensorExport, SystemMetricsExport};
use fluxport::{
    Bucket, BucketExport, FluxportConfig, InfluxClient, QueryBuilder, ResolvedWindow,
    TimeSeriesStore, registry, run_query,
};

use crate::common::{WindowArgs, load_config, parse_tag};

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Bucket category: system_metrics, sensor_data, sensor_data_aggregated, costs
    pub bucket: Bucket,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Measurement filter (repeat to match any of several)
    #[arg(short, long)]
    pub measurement: Vec<String>,

    /// Field filter (repeat to match any of several)
    #[arg(short, long)]
    pub field: Vec<String>,

    /// Tag filter key=value (repeat; values for one key are OR'd)
    #[arg(short, long)]
    pub tag: Vec<String>,

    /// Tag regex filter key=pattern
    #[arg(long)]
    pub tag_regex: Vec<String>,

    /// Aggregate into windows of this duration, e.g. 30m
    #[arg(long)]
    pub every: Option<String>,

    /// Aggregate function used with --every
    #[arg(long = "fn", default_value = "mean")]
    pub function: String,

    /// Sort by time: asc or desc
    #[arg(long)]
    pub sort: Option<String>,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long)]
    pub offset: Option<usize>,

    /// Keep only the base columns and the bucket's known tags
    #[arg(long)]
    pub keep_known: bool,

    /// Print the Flux query instead of running it
    #[arg(long)]
    pub print_flux: bool,

    /// Print undecoded rows
    #[arg(long)]
    pub raw: bool,
}

/// Run an ad-hoc query and print the result as NDJSON
pub async fn query_command(config_path: &Path, args: &QueryArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let window = args.window.window()?.resolve(Utc::now())?;
    let flux = build_query(&config, args, &window)?;

    if args.print_flux {
        writeln!(std::io::stdout().lock(), "{flux}")?;
        return Ok(());
    }

    let client = InfluxClient::new(&config.store).context("Failed to create store client")?;

    if args.raw {
        fluxport::config::validate_store(&config.store)?;
        let rows = client.query(&flux).await?;
        let mut out = std::io::stdout().lock();
        for row in &rows {
            serde_json::to_writer(&mut out, row.columns())?;
            writeln!(out)?;
        }
        return Ok(());
    }

    match args.bucket {
        Bucket::SystemMetrics => {
            print_records(&client, &config, &SystemMetricsExport::from_config(&config), &flux).await
        }
        Bucket::SensorData => {
            print_records(&client, &config, &SensorExport::from_config(&config), &flux).await
        }
        Bucket::SensorDataAggregated => {
            print_records(&client, &config, &AggregatedSensorExport::from_config(&config), &flux)
                .await
        }
        Bucket::Costs => {
            print_records(&client, &config, &CostExport::from_config(&config), &flux).await
        }
    }
}

/// Flux text for the given flags
pub fn build_query(
    config: &FluxportConfig,
    args: &QueryArgs,
    window: &ResolvedWindow,
) -> Result<String> {
    let mut query = QueryBuilder::from_bucket(config.bucket_name(args.bucket))?
        .range(window.start, window.end)?
        .measurements(args.measurement.as_slice())
        .fields(args.field.as_slice());

    for tag in &args.tag {
        let (key, value) = parse_tag(tag)?;
        query = query.tag(key, value);
    }
    for pattern in &args.tag_regex {
        let (key, regex) = parse_tag(pattern)?;
        query = query.tag_regex(key, regex);
    }
    if let Some(every) = &args.every {
        query = query.time_window(every.as_str(), args.function.as_str());
    }
    if let Some(direction) = &args.sort {
        query = query.sort(direction)?;
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = args.offset {
        query = query.offset(offset);
    }
    if args.keep_known {
        query = query.keep_columns(registry::known_columns(args.bucket).as_slice());
    }
    Ok(query.build())
}

async fn print_records<E: BucketExport>(
    store: &dyn TimeSeriesStore,
    config: &FluxportConfig,
    strategy: &E,
    flux: &str,
) -> Result<()> {
    let records = run_query(store, config, strategy, flux).await?;
    let mut out = std::io::stdout().lock();
    for record in &records {
        serde_json::to_writer(&mut out, record)?;
        writeln!(out)?;
    }
    let count = records.len();
    debug!("Printed {count} records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        query: QueryArgs,
    }

    fn window() -> ResolvedWindow {
        ResolvedWindow {
            start: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_flags_become_clauses() {
        let cli = TestCli::parse_from([
            "fluxport",
            "sensor-data",
            "-m",
            "°C",
            "-t",
            "entity_id=sensor.kitchen",
            "-t",
            "entity_id=sensor.attic",
            "--every",
            "1h",
            "--fn",
            "max",
            "--sort",
            "desc",
            "--limit",
            "5",
            "--keep-known",
        ]);
        let query = build_query(&FluxportConfig::default(), &cli.query, &window()).unwrap();
        assert!(query.starts_with("from(bucket: \"sensor_data\")"));
        assert!(query.contains(
            "(r.entity_id == \"sensor.kitchen\" or r.entity_id == \"sensor.attic\")"
        ));
        assert!(query.contains("aggregateWindow(every: 1h, fn: max, createEmpty: false)"));
        assert!(query.contains("desc: true"));
        assert!(query.contains("limit(n: 5, offset: 0)"));
        assert!(query.contains("\"entity_id\""));
    }

    #[test]
    fn test_bad_sort_is_rejected() {
        let cli = TestCli::parse_from(["fluxport", "costs", "--sort", "up"]);
        assert!(build_query(&FluxportConfig::default(), &cli.query, &window()).is_err());
    }
}
