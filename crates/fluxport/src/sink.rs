// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Newline-delimited JSON export files
//!
//! Each export writes one file `<prefix>_<yyyyMMdd_HHmmss>.json` holding one
//! record per line. The reader is used when importing a file back.

use crate::bucket::Bucket;
use crate::error::{Error, Result};
use crate::record::BucketRecord;
use chrono::{DateTime, Utc};
use diagnostics::*;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const FILE_TIMESTAMP: &str = "%Y%m%d_%H%M%S";
const FILE_EXTENSION: &str = "json";

/// One written export file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub bucket: Bucket,
    pub path: PathBuf,
    pub records: usize,
}

/// Writes export files into one folder
#[derive(Debug, Clone)]
pub struct NdjsonSink {
    folder: PathBuf,
}

impl NdjsonSink {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(folder: P) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    #[must_use]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// File name for an export taken at `at`
    #[must_use]
    pub fn file_name(bucket: Bucket, at: DateTime<Utc>) -> String {
        format!(
            "{}_{}.{FILE_EXTENSION}",
            bucket.file_prefix(),
            at.format(FILE_TIMESTAMP)
        )
    }

    pub fn write<T: Serialize>(&self, bucket: Bucket, records: &[T]) -> Result<ExportedFile> {
        self.write_at(bucket, records, Utc::now())
    }

    /// Write `records` to the file named for `at`, creating the folder if
    /// needed. An existing file is never overwritten.
    pub fn write_at<T: Serialize>(
        &self,
        bucket: Bucket,
        records: &[T],
        at: DateTime<Utc>,
    ) -> Result<ExportedFile> {
        std::fs::create_dir_all(&self.folder)?;
        let path = self.folder.join(Self::file_name(bucket, at));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => Error::invalid_argument(format!(
                    "export file {} already exists",
                    path.display()
                )),
                _ => Error::Io(e),
            })?;
        let mut out = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        let count = records.len();
        let shown = path.display().to_string();
        info!("Wrote {count} records to {shown}");
        Ok(ExportedFile {
            bucket,
            path,
            records: count,
        })
    }
}

/// Read an export file back as records of `bucket`; blank lines are skipped
pub fn read_records<P: AsRef<Path>>(bucket: Bucket, path: P) -> Result<Vec<BucketRecord>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = BucketRecord::from_json_line(bucket, &line).map_err(|e| {
            Error::invalid_argument(format!(
                "{}:{}: not a {bucket} record: {e}",
                path.display(),
                index + 1
            ))
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Bucket category from an export file name, longest prefix first
#[must_use]
pub fn bucket_for_file(path: &Path) -> Option<Bucket> {
    let name = path.file_name()?.to_str()?;
    let mut candidates: Vec<Bucket> = Bucket::ALL
        .into_iter()
        .filter(|b| name.starts_with(&format!("{}_", b.file_prefix())))
        .collect();
    candidates.sort_by_key(|b| std::cmp::Reverse(b.file_prefix().len()));
    candidates.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SystemMetricsRecord;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 4, 9, 5, 3).unwrap()
    }

    #[test]
    fn file_name_uses_prefix_and_timestamp() {
        assert_eq!(
            NdjsonSink::file_name(Bucket::SensorDataAggregated, at()),
            "sensor_data_aggregated_20240704_090503.json"
        );
    }

    #[test]
    fn writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = NdjsonSink::new(dir.path().join("nested/out"));
        let record = SystemMetricsRecord {
            measurement: "cpu".into(),
            time: at(),
            host: Some("nas".into()),
            fields: BTreeMap::from([("usage_idle".to_string(), json!(97.5))]),
            tags: BTreeMap::from([("host".to_string(), "nas".to_string())]),
        };

        let file = sink
            .write_at(Bucket::SystemMetrics, &[record.clone(), record.clone()], at())
            .unwrap();
        assert_eq!(file.records, 2);
        assert!(file.path.ends_with("system_metrics_20240704_090503.json"));

        let text = std::fs::read_to_string(&file.path).unwrap();
        assert_eq!(text.lines().count(), 2);

        let back = read_records(Bucket::SystemMetrics, &file.path).unwrap();
        assert_eq!(back, vec![BucketRecord::from(record.clone()), BucketRecord::from(record)]);
    }

    #[test]
    fn empty_export_still_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = NdjsonSink::new(dir.path());
        let file = sink.write_at::<BucketRecord>(Bucket::Costs, &[], at()).unwrap();
        assert_eq!(file.records, 0);
        assert!(file.path.exists());
    }

    #[test]
    fn existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let sink = NdjsonSink::new(dir.path());
        let first = sink.write_at::<BucketRecord>(Bucket::Costs, &[], at()).unwrap();
        std::fs::write(&first.path, "kept\n").unwrap();

        match sink.write_at::<BucketRecord>(Bucket::Costs, &[], at()) {
            Err(Error::InvalidArgument(message)) => assert!(message.contains("already exists")),
            other => panic!("expected invalid argument, got {other:?}"),
        }
        assert_eq!(std::fs::read_to_string(&first.path).unwrap(), "kept\n");
    }

    #[test]
    fn bad_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("costs_20240101_000000.json");
        std::fs::write(&path, "\n{\"measurement\": 1}\n").unwrap();
        match read_records(Bucket::Costs, &path) {
            Err(Error::InvalidArgument(message)) => assert!(message.contains(":2:")),
            other => panic!("expected invalid argument, got {other:?}"),
        }
    }

    #[test]
    fn bucket_from_file_name() {
        let p = |s: &str| PathBuf::from(s);
        assert_eq!(
            bucket_for_file(&p("out/sensor_data_aggregated_20240101_000000.json")),
            Some(Bucket::SensorDataAggregated)
        );
        assert_eq!(
            bucket_for_file(&p("sensor_data_20240101_000000.json")),
            Some(Bucket::SensorData)
        );
        assert_eq!(bucket_for_file(&p("notes.json")), None);
    }
}
