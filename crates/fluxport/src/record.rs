// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Decoded record types, one per bucket category.

use crate::bucket::Bucket;
use crate::line_protocol::{FieldValue, Point};
use crate::registry::{
    TAG_CATEGORY, TAG_CURRENCY, TAG_DEVICE_CLASS, TAG_ENTITY_ID, TAG_FRIENDLY_NAME, TAG_HOST,
    TAG_PROVIDER, TAG_UNIT, TAG_WINDOW,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field bag: field name to (coerced) value
pub type Fields = BTreeMap<String, Value>;

/// Tag bag: every non-underscore string column of the row
pub type Tags = BTreeMap<String, String>;

/// Host metrics, e.g. Telegraf `cpu`, `mem`, `disk`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SystemMetricsRecord {
    pub measurement: String,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub fields: Fields,
    #[serde(default)]
    pub tags: Tags,
}

/// Raw sensor reading
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub measurement: String,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub fields: Fields,
    #[serde(default)]
    pub tags: Tags,
}

/// Pre-aggregated sensor reading covering `[window_start, window_end)`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AggregatedSensorRecord {
    pub measurement: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub fields: Fields,
    #[serde(default)]
    pub tags: Tags,
}

/// A cost entry
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CostRecord {
    pub measurement: String,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub fields: Fields,
    #[serde(default)]
    pub tags: Tags,
}

/// Any decoded record
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum BucketRecord {
    SystemMetrics(SystemMetricsRecord),
    Sensor(SensorRecord),
    Aggregated(AggregatedSensorRecord),
    Cost(CostRecord),
}

impl BucketRecord {
    #[must_use]
    pub fn bucket(&self) -> Bucket {
        match self {
            BucketRecord::SystemMetrics(_) => Bucket::SystemMetrics,
            BucketRecord::Sensor(_) => Bucket::SensorData,
            BucketRecord::Aggregated(_) => Bucket::SensorDataAggregated,
            BucketRecord::Cost(_) => Bucket::Costs,
        }
    }

    #[must_use]
    pub fn measurement(&self) -> &str {
        match self {
            BucketRecord::SystemMetrics(r) => &r.measurement,
            BucketRecord::Sensor(r) => &r.measurement,
            BucketRecord::Aggregated(r) => &r.measurement,
            BucketRecord::Cost(r) => &r.measurement,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        match self {
            BucketRecord::SystemMetrics(r) => &r.fields,
            BucketRecord::Sensor(r) => &r.fields,
            BucketRecord::Aggregated(r) => &r.fields,
            BucketRecord::Cost(r) => &r.fields,
        }
    }

    /// Parse one exported JSON line as a record of `bucket`
    pub fn from_json_line(bucket: Bucket, line: &str) -> serde_json::Result<Self> {
        Ok(match bucket {
            Bucket::SystemMetrics => BucketRecord::SystemMetrics(serde_json::from_str(line)?),
            Bucket::SensorData => BucketRecord::Sensor(serde_json::from_str(line)?),
            Bucket::SensorDataAggregated => BucketRecord::Aggregated(serde_json::from_str(line)?),
            Bucket::Costs => BucketRecord::Cost(serde_json::from_str(line)?),
        })
    }

    /// Point for writing the record back; lifted attributes are restored as tags
    #[must_use]
    pub fn to_point(&self) -> Point {
        match self {
            BucketRecord::SystemMetrics(r) => {
                let lifted = [(TAG_HOST, &r.host)];
                assemble(&r.measurement, r.time, &r.tags, &lifted, &r.fields)
            }
            BucketRecord::Sensor(r) => {
                let lifted = [
                    (TAG_ENTITY_ID, &r.entity_id),
                    (TAG_FRIENDLY_NAME, &r.friendly_name),
                    (TAG_DEVICE_CLASS, &r.device_class),
                    (TAG_UNIT, &r.unit),
                ];
                assemble(&r.measurement, r.time, &r.tags, &lifted, &r.fields)
            }
            BucketRecord::Aggregated(r) => {
                let lifted = [
                    (TAG_ENTITY_ID, &r.entity_id),
                    (TAG_FRIENDLY_NAME, &r.friendly_name),
                    (TAG_DEVICE_CLASS, &r.device_class),
                    (TAG_UNIT, &r.unit),
                    (TAG_WINDOW, &r.window),
                ];
                assemble(&r.measurement, r.window_start, &r.tags, &lifted, &r.fields)
            }
            BucketRecord::Cost(r) => {
                let lifted = [
                    (TAG_CURRENCY, &r.currency),
                    (TAG_PROVIDER, &r.provider),
                    (TAG_CATEGORY, &r.category),
                ];
                assemble(&r.measurement, r.time, &r.tags, &lifted, &r.fields)
            }
        }
    }
}

fn assemble(
    measurement: &str,
    time: DateTime<Utc>,
    tags: &Tags,
    lifted: &[(&str, &Option<String>)],
    fields: &Fields,
) -> Point {
    let mut point = Point::new(measurement).time(time);
    for (key, value) in tags {
        point = point.tag(key.as_str(), value.as_str());
    }
    for (key, value) in lifted {
        if let Some(value) = value {
            point = point.tag(*key, value.as_str());
        }
    }
    for (key, value) in fields {
        if let Some(v) = FieldValue::from_json(value) {
            point = point.field(key.as_str(), v);
        }
    }
    point
}

/// Parts every record type carries, as seen by validation
pub trait RecordShape {
    fn measurement(&self) -> &str;

    fn fields(&self) -> &Fields;

    /// `[start, end)` of windowed records
    fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        None
    }
}

impl RecordShape for AggregatedSensorRecord {
    fn measurement(&self) -> &str {
        &self.measurement
    }

    fn fields(&self) -> &Fields {
        &self.fields
    }

    fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.window_start, self.window_end))
    }
}

macro_rules! impl_from_record {
    ($record:ty, $variant:ident) => {
        impl From<$record> for BucketRecord {
            fn from(r: $record) -> Self {
                BucketRecord::$variant(r)
            }
        }
    };
}

macro_rules! impl_record_shape {
    ($record:ty) => {
        impl RecordShape for $record {
            fn measurement(&self) -> &str {
                &self.measurement
            }

            fn fields(&self) -> &Fields {
                &self.fields
            }
        }
    };
}

impl_record_shape!(SystemMetricsRecord);
impl_record_shape!(SensorRecord);
impl_record_shape!(CostRecord);

impl_from_record!(SystemMetricsRecord, SystemMetrics);
impl_from_record!(SensorRecord, Sensor);
impl_from_record!(AggregatedSensorRecord, Aggregated);
impl_from_record!(CostRecord, Cost);
