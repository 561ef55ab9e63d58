// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Flux query builder
//!
//! Renders a pipeline query from composable clauses. Stage order is fixed
//! regardless of call order:
//!
//! ```text
//! from(bucket: "b")
//!   |> range(start: -24h, stop: now())
//!   |> filter(fn: (r) => <measurements> and <fields> and <tags> and <patterns> and <values>)
//!   |> aggregateWindow(every: 30m, fn: mean, createEmpty: false)
//!   |> map(fn: (r) => ...)
//!   |> sort(columns: ["_time"], desc: false)
//!   |> limit(n: 10, offset: 0)
//!   |> keep(columns: [...])
//! ```
//!
//! Repeated calls of the same kind (two `measurement`s, two `field`s, two
//! `tag`s with one key) are OR'd inside one clause; clauses of different
//! kinds are AND'd. Nothing is checked against the registry here.

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

/// Lookback used when no range was given
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

const STAGE_SEPARATOR: &str = "\n  |> ";

/// Time bounds of a query
#[derive(Debug, Clone, PartialEq)]
pub enum TimeRange {
    Absolute {
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    },
    /// From `now() - lookback` to `now()`
    Relative(TimeDelta),
}

/// Direction of the `_time` sort stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Accepts "asc" or "desc", case-insensitively
    pub fn parse(direction: &str) -> Result<Self> {
        match direction.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Ascending),
            "desc" => Ok(SortOrder::Descending),
            other => Err(Error::invalid_argument(format!(
                "sort direction must be 'asc' or 'desc', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct AggregateWindow {
    every: String,
    function: String,
}

#[derive(Debug, Clone, PartialEq)]
struct ValueRange {
    min: Option<f64>,
    max: Option<f64>,
}

/// Builder state; consumed by value, rendered by [`QueryBuilder::build`]
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    bucket: String,
    range: Option<TimeRange>,
    measurements: Vec<String>,
    fields: Vec<String>,
    tags: Vec<(String, Vec<String>)>,
    tag_patterns: Vec<(String, String)>,
    value_ranges: Vec<ValueRange>,
    windows: Vec<AggregateWindow>,
    maps: Vec<String>,
    sort: Option<SortOrder>,
    limit: Option<usize>,
    offset: Option<usize>,
    keep: Option<Vec<String>>,
}

impl QueryBuilder {
    /// Start a query against `bucket`; blank names are rejected
    pub fn from_bucket<S: Into<String>>(bucket: S) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(Error::invalid_argument("bucket name cannot be blank"));
        }
        Ok(Self {
            bucket,
            range: None,
            measurements: Vec::new(),
            fields: Vec::new(),
            tags: Vec::new(),
            tag_patterns: Vec::new(),
            value_ranges: Vec::new(),
            windows: Vec::new(),
            maps: Vec::new(),
            sort: None,
            limit: None,
            offset: None,
            keep: None,
        })
    }

    /// Absolute range; `start` must be before `stop`
    pub fn range(mut self, start: DateTime<Utc>, stop: DateTime<Utc>) -> Result<Self> {
        if start >= stop {
            return Err(Error::invalid_argument(format!(
                "range start {} must be before stop {}",
                rfc3339(start),
                rfc3339(stop)
            )));
        }
        self.range = Some(TimeRange::Absolute { start, stop });
        Ok(self)
    }

    /// Relative range ending now
    pub fn relative(mut self, lookback: TimeDelta) -> Result<Self> {
        if lookback <= TimeDelta::zero() {
            return Err(Error::invalid_argument("relative range must be positive"));
        }
        self.range = Some(TimeRange::Relative(lookback));
        Ok(self)
    }

    #[must_use]
    pub fn measurement<S: Into<String>>(mut self, name: S) -> Self {
        self.measurements.push(name.into());
        self
    }

    #[must_use]
    pub fn measurements<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.measurements
            .extend(names.iter().map(|n| n.as_ref().to_string()));
        self
    }

    #[must_use]
    pub fn field<S: Into<String>>(mut self, name: S) -> Self {
        self.fields.push(name.into());
        self
    }

    #[must_use]
    pub fn fields<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.fields.extend(names.iter().map(|n| n.as_ref().to_string()));
        self
    }

    /// Equality on a tag; several values for one key are OR'd
    #[must_use]
    pub fn tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.tags.push((key, vec![value])),
        }
        self
    }

    /// Regular-expression match on a tag
    #[must_use]
    pub fn tag_regex<K: Into<String>, P: Into<String>>(mut self, key: K, pattern: P) -> Self {
        self.tag_patterns.push((key.into(), pattern.into()));
        self
    }

    /// Inclusive bounds on `_value`
    #[must_use]
    pub fn value_range(mut self, min: f64, max: f64) -> Self {
        self.value_ranges.push(ValueRange {
            min: Some(min),
            max: Some(max),
        });
        self
    }

    #[must_use]
    pub fn min_value(mut self, min: f64) -> Self {
        self.value_ranges.push(ValueRange {
            min: Some(min),
            max: None,
        });
        self
    }

    #[must_use]
    pub fn max_value(mut self, max: f64) -> Self {
        self.value_ranges.push(ValueRange {
            min: None,
            max: Some(max),
        });
        self
    }

    /// `aggregateWindow(every: <every>, fn: <function>, createEmpty: false)`
    #[must_use]
    pub fn time_window<E: Into<String>, F: Into<String>>(mut self, every: E, function: F) -> Self {
        self.windows.push(AggregateWindow {
            every: every.into(),
            function: function.into(),
        });
        self
    }

    /// Map stage; `expr` is the lambda body, e.g. `({ r with _value: r._value * 100.0 })`
    #[must_use]
    pub fn map<S: Into<String>>(mut self, expr: S) -> Self {
        self.maps.push(expr.into());
        self
    }

    /// Sort by `_time`; direction must be "asc" or "desc"
    pub fn sort(mut self, direction: &str) -> Result<Self> {
        self.sort = Some(SortOrder::parse(direction)?);
        Ok(self)
    }

    #[must_use]
    pub fn sort_by(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Project the result onto the given columns
    #[must_use]
    pub fn keep_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.keep = Some(columns.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Render the query text; repeated calls produce the same string
    #[must_use]
    pub fn build(&self) -> String {
        let mut stages = vec![format!("from(bucket: {})", flux_string(&self.bucket))];

        stages.push(self.render_range());

        let predicates = self.render_predicates();
        if !predicates.is_empty() {
            stages.push(format!("filter(fn: (r) => {})", predicates.join(" and ")));
        }

        for window in &self.windows {
            stages.push(format!(
                "aggregateWindow(every: {}, fn: {}, createEmpty: false)",
                window.every, window.function
            ));
        }

        for expr in &self.maps {
            stages.push(format!("map(fn: (r) => {expr})"));
        }

        if let Some(order) = self.sort {
            let desc = order == SortOrder::Descending;
            stages.push(format!("sort(columns: [\"_time\"], desc: {desc})"));
        }

        if self.limit.is_some() || self.offset.is_some() {
            // Flux has no offset without n; an offset alone keeps everything after it
            let n = self.limit.unwrap_or(usize::MAX >> 1);
            let offset = self.offset.unwrap_or(0);
            stages.push(format!("limit(n: {n}, offset: {offset})"));
        }

        if let Some(columns) = &self.keep {
            let quoted: Vec<String> = columns.iter().map(|c| flux_string(c)).collect();
            stages.push(format!("keep(columns: [{}])", quoted.join(", ")));
        }

        stages.join(STAGE_SEPARATOR)
    }

    fn render_range(&self) -> String {
        match &self.range {
            Some(TimeRange::Absolute { start, stop }) => format!(
                "range(start: {}, stop: {})",
                rfc3339(*start),
                rfc3339(*stop)
            ),
            Some(TimeRange::Relative(lookback)) => {
                format!("range(start: -{}, stop: now())", flux_duration(*lookback))
            }
            None => format!("range(start: -{DEFAULT_LOOKBACK_HOURS}h, stop: now())"),
        }
    }

    fn render_predicates(&self) -> Vec<String> {
        let mut predicates = Vec::new();

        if !self.measurements.is_empty() {
            predicates.push(any_of("_measurement", &self.measurements));
        }
        if !self.fields.is_empty() {
            predicates.push(any_of("_field", &self.fields));
        }
        for (key, values) in &self.tags {
            predicates.push(any_of(key, values));
        }
        for (key, pattern) in &self.tag_patterns {
            predicates.push(format!("{} =~ {}", column_ref(key), flux_regex(pattern)));
        }
        for range in &self.value_ranges {
            let mut bounds = Vec::new();
            if let Some(min) = range.min {
                bounds.push(format!("r._value >= {}", flux_float(min)));
            }
            if let Some(max) = range.max {
                bounds.push(format!("r._value <= {}", flux_float(max)));
            }
            if !bounds.is_empty() {
                predicates.push(format!("({})", bounds.join(" and ")));
            }
        }

        predicates
    }
}

/// `(r.col == "a" or r.col == "b")`
fn any_of(column: &str, values: &[String]) -> String {
    let column = column_ref(column);
    let alternatives: Vec<String> = values
        .iter()
        .map(|v| format!("{column} == {}", flux_string(v)))
        .collect();
    format!("({})", alternatives.join(" or "))
}

/// Member access for plain identifiers, index syntax otherwise
fn column_ref(column: &str) -> String {
    let is_identifier = column
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if is_identifier {
        format!("r.{column}")
    } else {
        format!("r[{}]", flux_string(column))
    }
}

/// Quoted Flux string literal
pub fn flux_string(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace("${", "\\${");
    format!("\"{escaped}\"")
}

fn flux_regex(pattern: &str) -> String {
    format!("/{}/", pattern.replace('/', "\\/"))
}

fn flux_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Largest whole unit that divides the delta: `1d`, `6h`, `30m`, `90s`.
/// Sub-second parts are appended as a compound literal, e.g. `1s500ms`.
pub fn flux_duration(delta: TimeDelta) -> String {
    let secs = delta.num_seconds();
    let nanos = delta.subsec_nanos();
    if nanos == 0 {
        return whole_duration(secs);
    }
    let fraction = if nanos % 1_000_000 == 0 {
        format!("{}ms", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}us", nanos / 1_000)
    } else {
        format!("{nanos}ns")
    };
    if secs == 0 {
        fraction
    } else {
        format!("{}{fraction}", whole_duration(secs))
    }
}

fn whole_duration(secs: i64) -> String {
    if secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Second-precision UTC timestamp as Flux expects it
pub fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn builder() -> QueryBuilder {
        QueryBuilder::from_bucket("sensor_data").unwrap()
    }

    #[test]
    fn defaults_to_last_24_hours() {
        for bucket in crate::Bucket::ALL {
            let query = QueryBuilder::from_bucket(bucket.default_bucket_name())
                .unwrap()
                .build();
            assert!(query.starts_with(&format!("from(bucket: \"{}\")", bucket.default_bucket_name())));
            assert!(query.contains("|> range(start: -24h, stop: now())"), "{query}");
            assert!(!query.contains("filter("));
        }
    }

    #[test]
    fn blank_bucket_is_rejected() {
        assert!(matches!(
            QueryBuilder::from_bucket("  "),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn same_kind_or_cross_kind_and() {
        let query = builder()
            .measurement("°C")
            .field("value")
            .measurement("%")
            .tag("entity_id", "sensor.kitchen")
            .build();
        assert!(query.contains(
            "filter(fn: (r) => (r._measurement == \"°C\" or r._measurement == \"%\") and (r._field == \"value\") and (r.entity_id == \"sensor.kitchen\"))"
        ), "{query}");
    }

    #[test]
    fn same_tag_key_is_ored_different_keys_anded() {
        let query = builder()
            .tag("device_class", "temperature")
            .tag("domain", "sensor")
            .tag("device_class", "humidity")
            .build();
        assert!(query.contains(
            "(r.device_class == \"temperature\" or r.device_class == \"humidity\") and (r.domain == \"sensor\")"
        ), "{query}");
    }

    #[test]
    fn aggregate_window_clause() {
        let query = builder().time_window("30m", "mean").build();
        assert!(query.contains("|> aggregateWindow(every: 30m, fn: mean, createEmpty: false)"));
    }

    #[test]
    fn stage_order_is_fixed() {
        let query = builder()
            .keep_columns(&["_time", "_value"])
            .limit(10)
            .sort("desc")
            .unwrap()
            .map("({ r with _value: r._value * 2.0 })")
            .time_window("1h", "max")
            .field("value")
            .build();
        let positions: Vec<usize> = ["range(", "filter(", "aggregateWindow(", "map(", "sort(", "limit(", "keep("]
            .iter()
            .map(|stage| query.find(stage).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted, "{query}");
        assert!(query.contains("sort(columns: [\"_time\"], desc: true)"));
        assert!(query.contains("limit(n: 10, offset: 0)"));
        assert!(query.contains("keep(columns: [\"_time\", \"_value\"])"));
    }

    #[test]
    fn invalid_sort_fails_at_call_time() {
        let err = builder().sort("sideways").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(builder().sort("ASC").is_ok());
    }

    #[test]
    fn absolute_and_relative_ranges() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let stop = Utc.with_ymd_and_hms(2024, 3, 2, 12, 30, 0).unwrap();
        let query = builder().range(start, stop).unwrap().build();
        assert!(query.contains("range(start: 2024-03-01T00:00:00Z, stop: 2024-03-02T12:30:00Z)"));

        assert!(builder().range(stop, start).is_err());

        let query = builder().relative(TimeDelta::days(7)).unwrap().build();
        assert!(query.contains("range(start: -7d, stop: now())"));
        let query = builder().relative(TimeDelta::minutes(90)).unwrap().build();
        assert!(query.contains("range(start: -90m, stop: now())"));
    }

    #[test]
    fn sub_second_lookbacks_keep_their_fraction() {
        let query = builder().relative(TimeDelta::milliseconds(500)).unwrap().build();
        assert!(query.contains("range(start: -500ms, stop: now())"), "{query}");
        let query = builder().relative(TimeDelta::milliseconds(1500)).unwrap().build();
        assert!(query.contains("range(start: -1s500ms, stop: now())"), "{query}");
        let query = builder()
            .relative(TimeDelta::minutes(1) + TimeDelta::microseconds(250))
            .unwrap()
            .build();
        assert!(query.contains("range(start: -1m250us, stop: now())"), "{query}");
        assert_eq!(flux_duration(TimeDelta::nanoseconds(7)), "7ns");
    }

    #[test]
    fn regex_and_value_range() {
        let query = builder()
            .tag_regex("entity_id", "^sensor\\.lumi_.*/x")
            .value_range(0.0, 100.5)
            .min_value(-5.0)
            .build();
        assert!(query.contains("r.entity_id =~ /^sensor\\.lumi_.*\\/x/"), "{query}");
        assert!(query.contains("(r._value >= 0.0 and r._value <= 100.5)"));
        assert!(query.contains("(r._value >= -5.0)"));
    }

    #[test]
    fn escapes_strings_and_odd_column_names() {
        let query = builder().tag("unit of \"m\"", "a\\b${x}").build();
        assert!(query.contains(r#"r["unit of \"m\""] == "a\\b\${x}""#), "{query}");
    }

    #[test]
    fn build_is_idempotent() {
        let b = builder().measurement("W").sort("asc").unwrap().offset(5);
        assert_eq!(b.build(), b.build());
        assert!(b.build().contains("offset: 5"));
    }
}
