// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Record decoder
//!
//! Turns a raw query row into the record type of its bucket. Field values go
//! through the registry's coercion rules and well-known tags are lifted into
//! named attributes. Rows without a measurement column or a timestamp decode
//! to `None`. Everything else is checked by [`is_valid`]; records failing it
//! are skipped by callers.

use crate::bucket::Bucket;
use crate::record::{
    AggregatedSensorRecord, BucketRecord, CostRecord, Fields, RecordShape, SensorRecord,
    SystemMetricsRecord, Tags,
};
use crate::registry::{
    self, TAG_CATEGORY, TAG_CURRENCY, TAG_DEVICE_CLASS, TAG_ENTITY_ID, TAG_FRIENDLY_NAME, TAG_HOST,
    TAG_PROVIDER, TAG_UNIT, TAG_WINDOW,
};
use crate::row::FluxRecord;
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Window length assumed when the `window` tag is missing or unreadable
pub const DEFAULT_WINDOW_MINUTES: i64 = 30;

static WINDOW_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*([mhd])\s*$").ok());

/// Decode `row` as a record of `bucket`
#[must_use]
pub fn decode(row: &FluxRecord, bucket: Bucket) -> Option<BucketRecord> {
    let record = match bucket {
        Bucket::SystemMetrics => decode_system(row).map(BucketRecord::from),
        Bucket::SensorData => decode_sensor(row).map(BucketRecord::from),
        Bucket::SensorDataAggregated => decode_aggregated(row).map(BucketRecord::from),
        Bucket::Costs => decode_cost(row).map(BucketRecord::from),
    }?;
    validate(&record, bucket).then_some(record)
}

#[must_use]
pub fn decode_system(row: &FluxRecord) -> Option<SystemMetricsRecord> {
    let parts = RowParts::split(row, Bucket::SystemMetrics)?;
    let time = row.time()?;
    Some(SystemMetricsRecord {
        host: parts.lift(TAG_HOST),
        measurement: parts.measurement,
        time,
        fields: parts.fields,
        tags: parts.tags,
    })
}

#[must_use]
pub fn decode_sensor(row: &FluxRecord) -> Option<SensorRecord> {
    let parts = RowParts::split(row, Bucket::SensorData)?;
    let time = row.time()?;
    Some(SensorRecord {
        entity_id: parts.lift(TAG_ENTITY_ID),
        friendly_name: parts.lift(TAG_FRIENDLY_NAME),
        device_class: parts.lift(TAG_DEVICE_CLASS),
        unit: parts.lift(TAG_UNIT),
        measurement: parts.measurement,
        time,
        fields: parts.fields,
        tags: parts.tags,
    })
}

#[must_use]
pub fn decode_aggregated(row: &FluxRecord) -> Option<AggregatedSensorRecord> {
    let parts = RowParts::split(row, Bucket::SensorDataAggregated)?;
    let window_start = row.time().or_else(|| row.start())?;
    let window = parts.lift(TAG_WINDOW);
    let window_end = estimate_window_end(window_start, window.as_deref());
    Some(AggregatedSensorRecord {
        entity_id: parts.lift(TAG_ENTITY_ID),
        friendly_name: parts.lift(TAG_FRIENDLY_NAME),
        device_class: parts.lift(TAG_DEVICE_CLASS),
        unit: parts.lift(TAG_UNIT),
        measurement: parts.measurement,
        window_start,
        window_end,
        window,
        fields: parts.fields,
        tags: parts.tags,
    })
}

#[must_use]
pub fn decode_cost(row: &FluxRecord) -> Option<CostRecord> {
    let parts = RowParts::split(row, Bucket::Costs)?;
    let time = row.time()?;
    Some(CostRecord {
        currency: parts.lift(TAG_CURRENCY),
        provider: parts.lift(TAG_PROVIDER),
        category: parts.lift(TAG_CATEGORY),
        measurement: parts.measurement,
        time,
        fields: parts.fields,
        tags: parts.tags,
    })
}

/// Non-blank measurement, at least one field, and an ordered window if any
#[must_use]
pub fn is_valid<R: RecordShape>(record: &R) -> bool {
    if record.measurement().trim().is_empty() || record.fields().is_empty() {
        return false;
    }
    record.window().is_none_or(|(start, end)| start < end)
}

/// [`is_valid`], plus the record must belong to `bucket`
#[must_use]
pub fn validate(record: &BucketRecord, bucket: Bucket) -> bool {
    if record.bucket() != bucket {
        return false;
    }
    match record {
        BucketRecord::SystemMetrics(r) => is_valid(r),
        BucketRecord::Sensor(r) => is_valid(r),
        BucketRecord::Aggregated(r) => is_valid(r),
        BucketRecord::Cost(r) => is_valid(r),
    }
}

/// Length of a `window` tag such as `30m`, `1h` or `7d`
#[must_use]
pub fn window_duration(window: Option<&str>) -> TimeDelta {
    window
        .and_then(parse_window)
        .unwrap_or_else(|| TimeDelta::minutes(DEFAULT_WINDOW_MINUTES))
}

/// End of an aggregation window starting at `start`
#[must_use]
pub fn estimate_window_end(start: DateTime<Utc>, window: Option<&str>) -> DateTime<Utc> {
    let fallback = TimeDelta::minutes(DEFAULT_WINDOW_MINUTES);
    start
        .checked_add_signed(window_duration(window))
        .or_else(|| start.checked_add_signed(fallback))
        .unwrap_or(start)
}

fn parse_window(window: &str) -> Option<TimeDelta> {
    let captures = WINDOW_PATTERN.as_ref()?.captures(window)?;
    let amount: i64 = captures.get(1)?.as_str().parse().ok()?;
    if amount == 0 {
        return None;
    }
    match captures.get(2)?.as_str() {
        "m" => TimeDelta::try_minutes(amount),
        "h" => TimeDelta::try_hours(amount),
        "d" => TimeDelta::try_days(amount),
        _ => None,
    }
}

/// Measurement, coerced fields and tags pulled out of one row
struct RowParts {
    measurement: String,
    fields: Fields,
    tags: Tags,
}

impl RowParts {
    fn split(row: &FluxRecord, bucket: Bucket) -> Option<Self> {
        let measurement = row.measurement()?.to_string();
        let mut fields = Fields::new();

        match row.field() {
            Some(name) => {
                if let Some(value) = row.value() {
                    let coerced = registry::coerce_field(bucket, name, value.clone());
                    _ = fields.insert(name.to_string(), coerced);
                }
            }
            None => {
                // Pivoted row: every non-string user column is a field
                for (name, value) in row.user_columns().filter(|(_, v)| !v.is_string()) {
                    let coerced = registry::coerce_field(bucket, name, value.clone());
                    _ = fields.insert(name.clone(), coerced);
                }
            }
        }

        Some(Self {
            measurement,
            fields,
            tags: row.tags(),
        })
    }

    fn lift(&self, tag: &str) -> Option<String> {
        self.tags.get(tag).filter(|v| !v.is_empty()).cloned()
    }
}
