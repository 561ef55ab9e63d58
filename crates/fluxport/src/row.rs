// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! One result row of a Flux query: column name to value.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

pub const COL_MEASUREMENT: &str = "_measurement";
pub const COL_TIME: &str = "_time";
pub const COL_START: &str = "_start";
pub const COL_STOP: &str = "_stop";
pub const COL_FIELD: &str = "_field";
pub const COL_VALUE: &str = "_value";

/// Bookkeeping columns the store adds to every table
const RESERVED: [&str; 2] = ["result", "table"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxRecord {
    columns: BTreeMap<String, Value>,
}

impl FluxRecord {
    #[must_use]
    pub fn new(columns: BTreeMap<String, Value>) -> Self {
        Self { columns }
    }

    /// Builder-style insert, mostly for tests and fixtures
    #[must_use]
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        _ = self.columns.insert(key.into(), value.into());
        self
    }

    pub fn insert<K: Into<String>>(&mut self, key: K, value: Value) {
        _ = self.columns.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column).filter(|v| !v.is_null())
    }

    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    #[must_use]
    pub fn columns(&self) -> &BTreeMap<String, Value> {
        &self.columns
    }

    #[must_use]
    pub fn measurement(&self) -> Option<&str> {
        self.get_str(COL_MEASUREMENT)
    }

    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.get_str(COL_FIELD)
    }

    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.get(COL_VALUE)
    }

    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.get_time(COL_TIME)
    }

    #[must_use]
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.get_time(COL_START)
    }

    #[must_use]
    pub fn stop(&self) -> Option<DateTime<Utc>> {
        self.get_time(COL_STOP)
    }

    /// RFC 3339 strings or epoch nanoseconds
    #[must_use]
    pub fn get_time(&self, column: &str) -> Option<DateTime<Utc>> {
        match self.get(column)? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Value::Number(n) => n.as_i64().map(DateTime::from_timestamp_nanos),
            _ => None,
        }
    }

    /// User columns: not underscore-prefixed and not `result`/`table`
    pub fn user_columns(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns
            .iter()
            .filter(|(k, v)| !k.starts_with('_') && !RESERVED.contains(&k.as_str()) && !v.is_null())
    }

    /// String-valued user columns
    #[must_use]
    pub fn tags(&self) -> BTreeMap<String, String> {
        self.user_columns()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    }
}
