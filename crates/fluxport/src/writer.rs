// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Generic record writer
//!
//! Any `Serialize` value can be written as one point, given a [`WriteSchema`]
//! naming the measurement and which members are tags, fields and the
//! timestamp. Every value is checked before the store is called.

use crate::client::TimeSeriesStore;
use crate::error::{Error, Result};
use crate::line_protocol::{FieldValue, Point, Precision, encode_batch};
use crate::record::BucketRecord;
use chrono::{DateTime, Utc};
use diagnostics::*;
use serde::Serialize;
use serde_json::{Map, Value};

/// Points per store call when writing decoded records back
pub const RECORD_CHUNK_SIZE: usize = 5000;

/// Where points go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTarget {
    pub bucket: String,
    pub org: String,
    pub precision: Precision,
}

/// How a value maps onto a point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSchema {
    pub measurement: String,
    pub tag_fields: Vec<String>,
    /// Members written as fields; empty means every remaining scalar member
    pub value_fields: Vec<String>,
    pub timestamp_field: Option<String>,
}

impl WriteSchema {
    #[must_use]
    pub fn new<S: Into<String>>(measurement: S) -> Self {
        Self {
            measurement: measurement.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tags<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.tag_fields
            .extend(names.iter().map(|n| n.as_ref().to_string()));
        self
    }

    #[must_use]
    pub fn values<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.value_fields
            .extend(names.iter().map(|n| n.as_ref().to_string()));
        self
    }

    #[must_use]
    pub fn timestamp<S: Into<String>>(mut self, name: S) -> Self {
        self.timestamp_field = Some(name.into());
        self
    }

    /// The measurement declaration is mandatory
    pub fn validate(&self) -> Result<()> {
        if self.measurement.trim().is_empty() {
            return Err(Error::invalid_argument(
                "write schema does not declare a measurement",
            ));
        }
        Ok(())
    }

    /// Flatten `value` into a point
    pub fn to_point<T: Serialize>(&self, value: &T, precision: Precision) -> Result<Point> {
        self.validate()?;
        let members = match serde_json::to_value(value)? {
            Value::Object(members) => members,
            other => {
                return Err(Error::invalid_argument(format!(
                    "only structs can be written, got {}",
                    kind_name(&other)
                )));
            }
        };

        let mut point = Point::new(self.measurement.as_str());

        for name in &self.tag_fields {
            if let Some(tag) = members.get(name).and_then(tag_text) {
                point = point.tag(name.as_str(), tag);
            }
        }

        if let Some(name) = &self.timestamp_field {
            if let Some(raw) = members.get(name).filter(|v| !v.is_null()) {
                point = point.time(parse_timestamp(name, raw, precision)?);
            }
        }

        for (name, field) in self.field_members(&members) {
            if let Some(field) = FieldValue::from_json(field) {
                point = point.field(name.as_str(), field);
            }
        }

        if !point.has_fields() {
            return Err(Error::invalid_argument(format!(
                "value for measurement '{}' has no writable field",
                self.measurement
            )));
        }
        Ok(point)
    }

    fn field_members<'m>(
        &'m self,
        members: &'m Map<String, Value>,
    ) -> Box<dyn Iterator<Item = (&'m String, &'m Value)> + 'm> {
        if self.value_fields.is_empty() {
            Box::new(members.iter().filter(move |(name, _)| {
                !self.tag_fields.contains(*name) && self.timestamp_field.as_ref() != Some(*name)
            }))
        } else {
            Box::new(
                self.value_fields
                    .iter()
                    .filter_map(move |name| members.get(name).map(|v| (name, v))),
            )
        }
    }
}

fn tag_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_timestamp(name: &str, raw: &Value, precision: Precision) -> Result<DateTime<Utc>> {
    let parsed = match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|epoch| precision.datetime(epoch)),
        _ => None,
    };
    parsed.ok_or_else(|| {
        Error::invalid_argument(format!("member '{name}' is not a timestamp: {raw}"))
    })
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Writes values to one target
pub struct RecordWriter<'a> {
    store: &'a dyn TimeSeriesStore,
    target: WriteTarget,
}

impl<'a> RecordWriter<'a> {
    #[must_use]
    pub fn new(store: &'a dyn TimeSeriesStore, target: WriteTarget) -> Self {
        Self { store, target }
    }

    #[must_use]
    pub fn target(&self) -> &WriteTarget {
        &self.target
    }

    /// Write one value
    pub async fn write<T: Serialize + Sync>(&self, value: &T, schema: &WriteSchema) -> Result<()> {
        _ = self.write_batch(std::slice::from_ref(value), schema).await?;
        Ok(())
    }

    /// Validate every value, then write them all in one store call
    pub async fn write_batch<T: Serialize + Sync>(
        &self,
        values: &[T],
        schema: &WriteSchema,
    ) -> Result<usize> {
        schema.validate()?;
        let points = values
            .iter()
            .map(|value| schema.to_point(value, self.target.precision))
            .collect::<Result<Vec<_>>>()?;
        self.send(&points).await
    }

    /// Write decoded records back, e.g. from an export file
    pub async fn write_records(&self, records: &[BucketRecord]) -> Result<usize> {
        let points: Vec<Point> = records.iter().map(BucketRecord::to_point).collect();
        // Encode everything up front so a bad record fails before any write
        _ = encode_batch(&points, self.target.precision)?;

        let mut written = 0;
        for chunk in points.chunks(RECORD_CHUNK_SIZE) {
            written += self.send(chunk).await?;
        }
        Ok(written)
    }

    async fn send(&self, points: &[Point]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }
        let lines = encode_batch(points, self.target.precision)?;
        self.store.write(&self.target, lines).await?;

        let count = points.len();
        let bucket = self.target.bucket.as_str();
        info!("Wrote {count} points to {bucket}");
        Ok(count)
    }
}
