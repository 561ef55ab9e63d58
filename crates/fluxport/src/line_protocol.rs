// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Line protocol points
//!
//! `measurement,tag=a,tag2=b field=1.5,count=3i,label="x" 1700000000`

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Timestamp precision of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    #[serde(rename = "ns")]
    Nanoseconds,
    #[serde(rename = "us")]
    Microseconds,
    #[serde(rename = "ms")]
    Milliseconds,
    #[default]
    #[serde(rename = "s")]
    Seconds,
}

impl Precision {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "us",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
        }
    }

    /// Epoch offset of `t` in this precision
    #[must_use]
    pub fn timestamp(self, t: DateTime<Utc>) -> Option<i64> {
        match self {
            Precision::Nanoseconds => t.timestamp_nanos_opt(),
            Precision::Microseconds => Some(t.timestamp_micros()),
            Precision::Milliseconds => Some(t.timestamp_millis()),
            Precision::Seconds => Some(t.timestamp()),
        }
    }

    /// Inverse of [`Precision::timestamp`]
    #[must_use]
    pub fn datetime(self, epoch: i64) -> Option<DateTime<Utc>> {
        match self {
            Precision::Nanoseconds => Some(DateTime::from_timestamp_nanos(epoch)),
            Precision::Microseconds => DateTime::from_timestamp_micros(epoch),
            Precision::Milliseconds => DateTime::from_timestamp_millis(epoch),
            Precision::Seconds => DateTime::from_timestamp(epoch, 0),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "ns" => Ok(Precision::Nanoseconds),
            "us" => Ok(Precision::Microseconds),
            "ms" => Ok(Precision::Milliseconds),
            "s" => Ok(Precision::Seconds),
            other => Err(Error::invalid_argument(format!(
                "precision must be one of ns, us, ms, s; got '{other}'"
            ))),
        }
    }
}

/// A field value as the store types it
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    UInteger(u64),
    Boolean(bool),
    Text(String),
}

impl FieldValue {
    /// Scalars only; null, arrays and objects have no line-protocol form
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Integer(i))
                } else if let Some(u) = n.as_u64() {
                    Some(FieldValue::UInteger(u))
                } else {
                    n.as_f64().map(FieldValue::Float)
                }
            }
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn encode(&self, out: &mut String) -> Result<()> {
        match self {
            FieldValue::Float(f) => {
                if !f.is_finite() {
                    return Err(Error::invalid_argument(format!(
                        "non-finite float {f} cannot be written"
                    )));
                }
                out.push_str(&f.to_string());
            }
            FieldValue::Integer(i) => {
                out.push_str(&i.to_string());
                out.push('i');
            }
            FieldValue::UInteger(u) => {
                out.push_str(&u.to_string());
                out.push('u');
            }
            FieldValue::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            FieldValue::Text(s) => {
                out.push('"');
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
        }
        Ok(())
    }
}

/// One point to write
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    time: Option<DateTime<Utc>>,
}

impl Point {
    #[must_use]
    pub fn new<S: Into<String>>(measurement: S) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            time: None,
        }
    }

    #[must_use]
    pub fn tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        _ = self.tags.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn field<K: Into<String>>(mut self, key: K, value: FieldValue) -> Self {
        _ = self.fields.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    #[must_use]
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    #[must_use]
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Encode as one line; empty tag values are omitted
    pub fn to_line(&self, precision: Precision) -> Result<String> {
        if self.measurement.trim().is_empty() {
            return Err(Error::invalid_argument("point has a blank measurement"));
        }
        if self.fields.is_empty() {
            return Err(Error::invalid_argument(format!(
                "point '{}' has no fields",
                self.measurement
            )));
        }

        let mut line = String::new();
        escape_into(&mut line, &self.measurement, &[',', ' ']);

        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }

        let mut separator = ' ';
        for (key, value) in &self.fields {
            line.push(separator);
            separator = ',';
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            value.encode(&mut line)?;
        }

        if let Some(time) = self.time {
            let epoch = precision.timestamp(time).ok_or_else(|| {
                Error::invalid_argument(format!("timestamp {time} out of range for {precision}"))
            })?;
            line.push(' ');
            line.push_str(&epoch.to_string());
        }

        Ok(line)
    }
}

fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Encode a batch, one point per line
pub fn encode_batch(points: &[Point], precision: Precision) -> Result<String> {
    let lines = points
        .iter()
        .map(|p| p.to_line(precision))
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn encodes_all_value_kinds() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let line = Point::new("costs")
            .tag("currency", "EUR")
            .tag("provider", "City Power")
            .field("amount", FieldValue::Float(42.5))
            .field("count", FieldValue::Integer(3))
            .field("paid", FieldValue::Boolean(true))
            .field("note", FieldValue::Text("say \"hi\"".into()))
            .time(t)
            .to_line(Precision::Seconds)
            .unwrap();
        assert_eq!(
            line,
            r#"costs,currency=EUR,provider=City\ Power amount=42.5,count=3i,note="say \"hi\"",paid=true 1704067200"#
        );
    }

    #[test]
    fn escapes_measurement_and_keys() {
        let line = Point::new("energy, total")
            .tag("a=b", "x,y")
            .tag("empty", "")
            .field("w h", FieldValue::UInteger(7))
            .to_line(Precision::Nanoseconds)
            .unwrap();
        assert_eq!(line, r"energy\,\ total,a\=b=x\,y w\ h=7u");
    }

    #[test]
    fn precision_scales_timestamp() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let p = Point::new("m").field("v", FieldValue::Float(1.0)).time(t);
        assert!(p.to_line(Precision::Milliseconds).unwrap().ends_with(" 1704067200000"));
        assert!(p.to_line(Precision::Nanoseconds).unwrap().ends_with(" 1704067200000000000"));
        assert_eq!(Precision::Milliseconds.datetime(1_704_067_200_000), Some(t));
    }

    #[test]
    fn rejects_points_without_fields() {
        assert!(Point::new("m").to_line(Precision::Seconds).is_err());
        assert!(Point::new(" ").field("v", FieldValue::Integer(1)).to_line(Precision::Seconds).is_err());
        assert!(Point::new("m").field("v", FieldValue::Float(f64::NAN)).to_line(Precision::Seconds).is_err());
    }

    #[test]
    fn json_scalars_map_to_field_values() {
        assert_eq!(FieldValue::from_json(&json!(1)), Some(FieldValue::Integer(1)));
        assert_eq!(FieldValue::from_json(&json!(u64::MAX)), Some(FieldValue::UInteger(u64::MAX)));
        assert_eq!(FieldValue::from_json(&json!(0.5)), Some(FieldValue::Float(0.5)));
        assert_eq!(FieldValue::from_json(&json!([1])), None);
        assert_eq!("ms".parse::<Precision>().unwrap(), Precision::Milliseconds);
        assert!("hours".parse::<Precision>().is_err());
    }
}
