// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fluxport::config::StoreConfig;
use fluxport::export::{CostExport, SensorExport};
use fluxport::sink::read_records;
use fluxport::{
    Bucket, BucketRecord, Error, ExportWindow, Exporter, FluxRecord, FluxportConfig, NdjsonSink,
    RecordWriter, Result, TimeSeriesStore, WriteSchema, WriteTarget, export_bucket,
};
use serde::Serialize;
use tempfile::tempdir;

const T: &str = "2024-03-01T08:00:00Z";

/// In-memory store: canned rows per bucket name, one bucket can be made to fail
#[derive(Default)]
struct MockStore {
    failing_bucket: Option<String>,
    queries: AtomicUsize,
    flux: Mutex<Vec<String>>,
    writes: Mutex<Vec<(WriteTarget, String)>>,
}

impl MockStore {
    fn failing(bucket: &str) -> Self {
        Self {
            failing_bucket: Some(bucket.to_string()),
            ..Self::default()
        }
    }

    fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    fn rows_for(bucket: &str) -> Vec<FluxRecord> {
        let row = FluxRecord::default()
            .with("result", "_result")
            .with("table", 0)
            .with("_time", T)
            .with("_value", 12.5);
        match bucket {
            "system_metrics" => vec![
                row.clone()
                    .with("_measurement", "cpu")
                    .with("_field", "usage_idle")
                    .with("host", "nas"),
            ],
            "sensor_data" => vec![
                row.clone()
                    .with("_measurement", "°C")
                    .with("_field", "value")
                    .with("entity_id", "sensor.kitchen"),
                // no measurement: dropped by the decoder
                row.clone().with("_field", "value"),
                // blank measurement: decodes, then fails validation
                row.clone()
                    .with("_measurement", " ")
                    .with("_field", "value")
                    .with("entity_id", "sensor.hall"),
                // no _field/_value and no tags
                FluxRecord::default()
                    .with("result", "_result")
                    .with("table", 1)
                    .with("_measurement", "°C")
                    .with("_time", T),
                row.clone()
                    .with("_measurement", "%")
                    .with("_field", "value")
                    .with("entity_id", "sensor.kitchen_humidity"),
            ],
            "sensor_data_30m" => vec![
                row.clone()
                    .with("_measurement", "°C")
                    .with("_field", "mean")
                    .with("window", "30m"),
            ],
            "costs" => vec![
                row.clone()
                    .with("_measurement", "electricity")
                    .with("_field", "amount")
                    .with("currency", "EUR")
                    .with("provider", "grid"),
            ],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl TimeSeriesStore for MockStore {
    async fn query(&self, flux: &str) -> Result<Vec<FluxRecord>> {
        _ = self.queries.fetch_add(1, Ordering::SeqCst);
        self.flux.lock().unwrap().push(flux.to_string());
        let bucket = flux
            .split('"')
            .nth(1)
            .ok_or_else(|| Error::invalid_argument("query without bucket"))?;
        if self.failing_bucket.as_deref() == Some(bucket) {
            return Err(Error::Http {
                status: 404,
                body: format!("bucket \"{bucket}\" not found"),
            });
        }
        Ok(Self::rows_for(bucket))
    }

    async fn write(&self, target: &WriteTarget, lines: String) -> Result<()> {
        self.writes.lock().unwrap().push((target.clone(), lines));
        Ok(())
    }
}

fn config() -> FluxportConfig {
    let mut config = FluxportConfig {
        store: StoreConfig {
            url: "http://localhost:8086".into(),
            token: "secret".into(),
            org: "home".into(),
            timeout_seconds: None,
        },
        ..FluxportConfig::default()
    };
    config.export.enabled = true;
    config
}

fn window() -> ExportWindow {
    ExportWindow::new(
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
        Some(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()),
    )
}

#[tokio::test]
async fn test_failing_bucket_does_not_stop_the_others() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let store = MockStore::failing("sensor_data");
    let config = config();
    let exporter = Exporter::new(&store, &config).with_sink(NdjsonSink::new(tmp.path()));

    let files = exporter.export_all(&window()).await?;

    assert_eq!(store.query_count(), 4);
    let buckets: Vec<Bucket> = files.iter().map(|f| f.bucket).collect();
    assert_eq!(
        buckets,
        vec![Bucket::SystemMetrics, Bucket::SensorDataAggregated, Bucket::Costs]
    );
    for file in &files {
        assert!(file.path.starts_with(tmp.path()));
        assert_eq!(file.records, 1);
    }
    Ok(())
}

#[tokio::test]
async fn test_buckets_share_one_resolved_window() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let store = MockStore::default();
    let config = config();
    let exporter = Exporter::new(&store, &config).with_sink(NdjsonSink::new(tmp.path()));

    let files = exporter.export_all(&ExportWindow::default()).await?;
    assert_eq!(files.len(), 4);

    let flux = store.flux.lock().unwrap();
    let ranges: Vec<&str> = flux
        .iter()
        .filter_map(|q| q.lines().find(|l| l.contains("range(")))
        .collect();
    assert_eq!(ranges.len(), 4);
    assert!(ranges.iter().all(|r| *r == ranges[0]), "{ranges:?}");
    Ok(())
}

#[tokio::test]
async fn test_repeated_bucket_is_exported_once() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let store = MockStore::default();
    let config = config();
    let exporter = Exporter::new(&store, &config).with_sink(NdjsonSink::new(tmp.path()));

    let files = exporter
        .export_selected(&[Bucket::Costs, Bucket::Costs], &window())
        .await?;
    assert_eq!(files.len(), 1);
    assert_eq!(store.query_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_disabled_export_makes_no_store_calls() {
    let store = MockStore::default();
    let mut config = config();
    config.export.enabled = false;

    let result = Exporter::new(&store, &config).export_all(&window()).await;
    assert!(matches!(result, Err(Error::Configuration(_))));
    assert_eq!(store.query_count(), 0);
}

#[tokio::test]
async fn test_inverted_window_fails_before_querying() {
    let store = MockStore::default();
    let config = config();
    let inverted = ExportWindow::new(window().end, window().start);

    let result = Exporter::new(&store, &config).export_all(&inverted).await;
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(store.query_count(), 0);
}

#[tokio::test]
async fn test_malformed_rows_are_dropped() -> anyhow::Result<()> {
    let store = MockStore::default();
    let config = config();
    let strategy = SensorExport::from_config(&config);

    let records = export_bucket(&store, &config, &strategy, &window()).await?;
    let entities: Vec<Option<&str>> = records.iter().map(|r| r.entity_id.as_deref()).collect();
    assert_eq!(
        entities,
        vec![Some("sensor.kitchen"), Some("sensor.kitchen_humidity")]
    );
    assert_eq!(records[0].fields["value"], serde_json::json!(12.5));
    assert_eq!(records[1].measurement, "%");
    Ok(())
}

#[tokio::test]
async fn test_store_failure_names_the_bucket() {
    let store = MockStore::failing("costs");
    let config = config();
    let strategy = CostExport::from_config(&config);

    let err = export_bucket(&store, &config, &strategy, &window())
        .await
        .unwrap_err();
    match err {
        Error::ExportFailure { bucket, source } => {
            assert_eq!(bucket, "costs");
            assert!(matches!(*source, Error::Http { status: 404, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_exported_costs_write_back() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let store = MockStore::default();
    let config = config();
    let exporter = Exporter::new(&store, &config).with_sink(NdjsonSink::new(tmp.path()));

    let file = exporter.export_one(Bucket::Costs, &window()).await?;
    let records = read_records(Bucket::Costs, &file.path)?;
    let BucketRecord::Cost(cost) = &records[0] else {
        panic!("expected a cost record");
    };
    assert_eq!(cost.currency.as_deref(), Some("EUR"));

    let target = config.write_target()?;
    let writer = RecordWriter::new(&store, target);
    assert_eq!(writer.write_records(&records).await?, 1);

    let writes = store.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    let (target, lines) = &writes[0];
    assert_eq!(target.org, "home");
    assert!(lines.starts_with("electricity,"));
    assert!(lines.contains("currency=EUR"));
    assert!(lines.contains("provider=grid"));
    assert!(lines.ends_with(" 1709280000"));
    Ok(())
}

#[derive(Serialize)]
struct Reading {
    sensor: String,
    celsius: f64,
}

#[tokio::test]
async fn test_batch_is_one_store_call() -> anyhow::Result<()> {
    let store = MockStore::default();
    let writer = RecordWriter::new(&store, config().write_target()?);
    let schema = WriteSchema::new("climate").tags(&["sensor"]);

    let readings = vec![
        Reading {
            sensor: "lumi_1".into(),
            celsius: 21.5,
        },
        Reading {
            sensor: "lumi_2".into(),
            celsius: 19.0,
        },
    ];
    assert_eq!(writer.write_batch(&readings, &schema).await?, 2);
    assert_eq!(store.write_count(), 1);

    let empty: Vec<Reading> = Vec::new();
    assert_eq!(writer.write_batch(&empty, &schema).await?, 0);
    assert_eq!(store.write_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_blank_measurement_never_reaches_the_store() {
    let store = MockStore::default();
    let writer = RecordWriter::new(&store, config().write_target().unwrap());
    let schema = WriteSchema::new("  ");

    let reading = Reading {
        sensor: "lumi_1".into(),
        celsius: 21.5,
    };
    let result = writer.write(&reading, &schema).await;
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(store.write_count(), 0);
}
