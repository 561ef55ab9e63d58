// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Export/import layer for a tag/field time-series store
//!
//! Queries are built with [`QueryBuilder`], rows come back through a
//! [`TimeSeriesStore`], are decoded per bucket category into typed records
//! and written to NDJSON files. [`RecordWriter`] goes the other way.

pub mod bucket;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod export;
pub mod line_protocol;
pub mod query;
pub mod record;
pub mod registry;
pub mod row;
pub mod sink;
pub mod writer;

pub use bucket::Bucket;
pub use client::{InfluxClient, TimeSeriesStore};
pub use config::{FluxportConfig, load_config};
pub use error::{Error, Result};
pub use export::{
    BucketExport, ExportWindow, Exporter, ResolvedWindow, export_bucket, export_resolved, run_query,
};
pub use line_protocol::{FieldValue, Point, Precision};
pub use query::{QueryBuilder, SortOrder};
pub use record::{AggregatedSensorRecord, BucketRecord, CostRecord, SensorRecord, SystemMetricsRecord};
pub use row::FluxRecord;
pub use sink::{ExportedFile, NdjsonSink};
pub use writer::{RecordWriter, WriteSchema, WriteTarget};
