// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Type/schema registry
//!
//! Static catalogue of known measurements, fields and tags per bucket
//! category, plus the field-name heuristics deciding which type a field
//! value is coerced to. Rules are evaluated in order; the first match wins.

use crate::bucket::Bucket;
use serde_json::{Number, Value};

// ============================================================================
// Well-known tag names
// ============================================================================

pub const TAG_ENTITY_ID: &str = "entity_id";
pub const TAG_FRIENDLY_NAME: &str = "friendly_name";
pub const TAG_DEVICE_CLASS: &str = "device_class";
pub const TAG_UNIT: &str = "unit_of_measurement";
pub const TAG_DOMAIN: &str = "domain";
pub const TAG_LOCATION: &str = "location";
pub const TAG_HOST: &str = "host";
pub const TAG_WINDOW: &str = "window";
pub const TAG_STATISTIC: &str = "statistic";
pub const TAG_CURRENCY: &str = "currency";
pub const TAG_PROVIDER: &str = "provider";
pub const TAG_CATEGORY: &str = "category";
pub const TAG_BILLING_PERIOD: &str = "billing_period";

/// Columns every row carries, whatever the bucket
pub const BASE_COLUMNS: [&str; 6] = ["_start", "_stop", "_time", "_measurement", "_field", "_value"];

// ============================================================================
// Coercion rules
// ============================================================================

/// Target type of a coerced field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Float,
    Integer,
    Boolean,
    Text,
}

/// How a rule matches a field name (case-insensitive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMatch {
    Exact(&'static str),
    Contains(&'static str),
    Prefix(&'static str),
    Suffix(&'static str),
}

impl FieldMatch {
    #[must_use]
    pub fn matches(self, field: &str) -> bool {
        let field = field.to_ascii_lowercase();
        match self {
            FieldMatch::Exact(s) => field == s,
            FieldMatch::Contains(s) => field.contains(s),
            FieldMatch::Prefix(s) => field.starts_with(s),
            FieldMatch::Suffix(s) => field.ends_with(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoercionRule {
    pub matcher: FieldMatch,
    pub kind: ValueKind,
}

const fn rule(matcher: FieldMatch, kind: ValueKind) -> CoercionRule {
    CoercionRule { matcher, kind }
}

use FieldMatch::{Contains, Exact, Prefix, Suffix};
use ValueKind::{Boolean, Float, Integer, Text};

/// Per-category catalogue
#[derive(Debug)]
pub struct BucketSchema {
    pub measurements: &'static [&'static str],
    pub fields: &'static [&'static str],
    pub tags: &'static [&'static str],
    pub rules: &'static [CoercionRule],
}

static SYSTEM_METRICS: BucketSchema = BucketSchema {
    measurements: &["cpu", "mem", "disk", "diskio", "net", "system", "processes", "swap", "temp"],
    fields: &[
        "usage_idle", "usage_user", "usage_system", "usage_iowait", "usage_steal",
        "used_percent", "available_percent", "used", "free", "total", "available",
        "load1", "load5", "load15", "n_cpus", "uptime", "bytes_sent", "bytes_recv",
        "reads", "writes", "total_threads", "running", "sleeping", "temp",
    ],
    tags: &[TAG_HOST, "cpu", "device", "path", "fstype", "interface", "mode", "sensor"],
    rules: &[
        rule(Contains("percent"), Float),
        rule(Contains("usage"), Float),
        rule(Prefix("load"), Float),
        rule(Exact("temp"), Float),
        rule(Contains("count"), Integer),
        rule(Contains("total"), Integer),
        rule(Prefix("n_"), Integer),
        rule(Contains("bytes"), Integer),
        rule(Exact("used"), Integer),
        rule(Exact("free"), Integer),
        rule(Exact("available"), Integer),
        rule(Exact("uptime"), Integer),
        rule(Exact("reads"), Integer),
        rule(Exact("writes"), Integer),
    ],
};

static SENSOR_DATA: BucketSchema = BucketSchema {
    measurements: &["°C", "%", "W", "kWh", "V", "A", "hPa", "lx", "ppm", "state"],
    fields: &[
        "value", "temperature", "humidity", "pressure", "power", "energy", "voltage",
        "current", "illuminance", "battery", "linkquality", "state", "current_temperature",
        "target_temp_high", "target_temp_low",
    ],
    tags: &[
        TAG_ENTITY_ID, TAG_FRIENDLY_NAME, TAG_DEVICE_CLASS, TAG_UNIT, TAG_DOMAIN,
        TAG_LOCATION, "source",
    ],
    rules: &[
        rule(Exact("value"), Float),
        rule(Contains("temperature"), Float),
        rule(Contains("temp_"), Float),
        rule(Contains("humidity"), Float),
        rule(Contains("pressure"), Float),
        rule(Contains("power"), Float),
        rule(Contains("energy"), Float),
        rule(Contains("voltage"), Float),
        rule(Exact("current"), Float),
        rule(Contains("illuminance"), Float),
        rule(Contains("battery"), Float),
        rule(Contains("percent"), Float),
        rule(Contains("usage"), Float),
        rule(Contains("consumption"), Float),
        rule(Contains("linkquality"), Integer),
        rule(Contains("count"), Integer),
        rule(Contains("total"), Integer),
        rule(Exact("state"), Text),
        rule(Suffix("_str"), Text),
        rule(Prefix("is_"), Boolean),
    ],
};

static SENSOR_DATA_AGGREGATED: BucketSchema = BucketSchema {
    measurements: &["sensor_30m", "climate_30m", "energy_30m"],
    fields: &["mean", "min", "max", "sum", "count", "stddev", "median", "first", "last"],
    tags: &[
        TAG_ENTITY_ID, TAG_FRIENDLY_NAME, TAG_DEVICE_CLASS, TAG_UNIT, TAG_WINDOW,
        TAG_STATISTIC, TAG_LOCATION,
    ],
    rules: &[
        rule(Contains("count"), Integer),
        rule(Contains("mean"), Float),
        rule(Contains("min"), Float),
        rule(Contains("max"), Float),
        rule(Contains("sum"), Float),
        rule(Contains("stddev"), Float),
        rule(Contains("median"), Float),
        rule(Exact("first"), Float),
        rule(Exact("last"), Float),
        rule(Contains("percent"), Float),
        rule(Contains("usage"), Float),
        rule(Contains("total"), Integer),
    ],
};

static COSTS: BucketSchema = BucketSchema {
    measurements: &["costs", "energy_costs", "subscriptions", "utility_bill"],
    fields: &[
        "amount", "cost", "total_cost", "unit_price", "price", "rate", "consumption",
        "usage", "quantity", "count",
    ],
    tags: &[
        TAG_CURRENCY, TAG_PROVIDER, TAG_CATEGORY, TAG_BILLING_PERIOD, "meter_id",
        "description", "date",
    ],
    rules: &[
        rule(Contains("cost"), Float),
        rule(Contains("price"), Float),
        rule(Contains("rate"), Float),
        rule(Contains("amount"), Float),
        rule(Contains("consumption"), Float),
        rule(Contains("usage"), Float),
        rule(Contains("percent"), Float),
        // money totals, unlike the counters of the other buckets
        rule(Contains("total"), Float),
        rule(Contains("count"), Integer),
        rule(Contains("quantity"), Integer),
    ],
};

/// Catalogue of one bucket category
#[must_use]
pub fn schema(bucket: Bucket) -> &'static BucketSchema {
    match bucket {
        Bucket::SystemMetrics => &SYSTEM_METRICS,
        Bucket::SensorData => &SENSOR_DATA,
        Bucket::SensorDataAggregated => &SENSOR_DATA_AGGREGATED,
        Bucket::Costs => &COSTS,
    }
}

/// First matching rule's target kind, if any
#[must_use]
pub fn kind_for(bucket: Bucket, field: &str) -> Option<ValueKind> {
    schema(bucket)
        .rules
        .iter()
        .find(|r| r.matcher.matches(field))
        .map(|r| r.kind)
}

#[must_use]
pub fn is_known_measurement(bucket: Bucket, measurement: &str) -> bool {
    schema(bucket).measurements.contains(&measurement)
}

#[must_use]
pub fn is_known_field(bucket: Bucket, field: &str) -> bool {
    schema(bucket).fields.contains(&field)
}

#[must_use]
pub fn is_known_tag(bucket: Bucket, tag: &str) -> bool {
    schema(bucket).tags.contains(&tag)
}

/// Base columns plus the bucket's known tags, for `keep(columns: ...)`
#[must_use]
pub fn known_columns(bucket: Bucket) -> Vec<String> {
    BASE_COLUMNS
        .iter()
        .chain(schema(bucket).tags.iter())
        .map(|c| (*c).to_string())
        .collect()
}

// ============================================================================
// Coercion
// ============================================================================

/// Convert `value` to `kind`; on failure the untouched original comes back as `Err`
pub fn coerce(value: Value, kind: ValueKind) -> Result<Value, Value> {
    match kind {
        ValueKind::Float => to_float(&value).ok_or(value),
        ValueKind::Integer => to_integer(&value).ok_or(value),
        ValueKind::Boolean => to_boolean(&value).ok_or(value),
        ValueKind::Text => to_text(&value).ok_or(value),
    }
}

/// Lenient coercion through the bucket's rules; unmatched or failing values pass through
#[must_use]
pub fn coerce_field(bucket: Bucket, field: &str, value: Value) -> Value {
    match kind_for(bucket, field) {
        Some(kind) => coerce(value, kind).unwrap_or_else(|original| original),
        None => value,
    }
}

fn to_float(value: &Value) -> Option<Value> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !f.is_finite() {
        return None;
    }
    Number::from_f64(f).map(Value::Number)
}

fn to_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => whole_float(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Some(Value::from(i)),
                Err(_) => whole_float(s.parse::<f64>().ok()?),
            }
        }
        _ => None,
    }
}

fn whole_float(f: f64) -> Option<Value> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

fn to_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "1" | "yes" => Some(Value::Bool(true)),
            "false" | "off" | "0" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        _ => None,
    }
}

fn to_text(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_looking_string_becomes_float() {
        let v = coerce_field(Bucket::SystemMetrics, "usage_idle", json!("42.5"));
        assert_eq!(v, json!(42.5));
        assert!(v.is_f64());
    }

    #[test]
    fn count_and_total_become_integers() {
        assert_eq!(kind_for(Bucket::SystemMetrics, "total"), Some(ValueKind::Integer));
        assert_eq!(coerce_field(Bucket::SensorDataAggregated, "count", json!("12")), json!(12));
        assert_eq!(coerce_field(Bucket::SensorDataAggregated, "count", json!(12.0)), json!(12));
    }

    #[test]
    fn cost_totals_stay_money() {
        assert_eq!(kind_for(Bucket::Costs, "total"), Some(ValueKind::Float));
        assert_eq!(coerce_field(Bucket::Costs, "total", json!("19.99")), json!(19.99));
        assert_eq!(coerce_field(Bucket::SystemMetrics, "total", json!("19")), json!(19));
    }

    #[test]
    fn first_rule_wins() {
        // "total_cost" contains both "cost" and "total"; costs list "cost" first
        assert_eq!(kind_for(Bucket::Costs, "total_cost"), Some(ValueKind::Float));
        assert_eq!(kind_for(Bucket::SystemMetrics, "USED_PERCENT"), Some(ValueKind::Float));
    }

    #[test]
    fn failed_coercion_returns_original() {
        assert_eq!(coerce(json!("n/a"), ValueKind::Float), Err(json!("n/a")));
        assert_eq!(coerce(json!(1.5), ValueKind::Integer), Err(json!(1.5)));
        assert_eq!(coerce_field(Bucket::SystemMetrics, "usage_user", json!("idle")), json!("idle"));
    }

    #[test]
    fn unmatched_fields_pass_through() {
        assert_eq!(kind_for(Bucket::Costs, "note"), None);
        assert_eq!(coerce_field(Bucket::Costs, "note", json!("12")), json!("12"));
    }

    #[test]
    fn boolean_and_text_coercion() {
        assert_eq!(coerce(json!("ON"), ValueKind::Boolean), Ok(json!(true)));
        assert_eq!(coerce(json!(0), ValueKind::Boolean), Ok(json!(false)));
        assert_eq!(coerce(json!(21.5), ValueKind::Text), Ok(json!("21.5")));
        assert_eq!(coerce_field(Bucket::SensorData, "state", json!(1)), json!("1"));
    }

    #[test]
    fn known_columns_include_bucket_tags() {
        let cols = known_columns(Bucket::Costs);
        assert!(cols.contains(&"_value".to_string()));
        assert!(cols.contains(&TAG_CURRENCY.to_string()));
        assert!(is_known_tag(Bucket::SensorData, TAG_ENTITY_ID));
        assert!(is_known_measurement(Bucket::SystemMetrics, "cpu"));
        assert!(is_known_field(Bucket::SensorDataAggregated, "stddev"));
    }
}
