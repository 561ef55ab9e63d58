// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Annotated CSV query responses
//!
//! The store answers a Flux query with one or more tables. Each table may be
//! preceded by annotation rows (`#datatype`, `#group`, `#default`), then a
//! header row, then data rows. The first column is reserved for annotation
//! names and is empty on header and data rows. A header naming an `error`
//! column marks an error table.

use crate::error::{Error, Result};
use crate::row::FluxRecord;
use csv::{ReaderBuilder, StringRecord};
use serde_json::{Number, Value};

const DATATYPE: &str = "#datatype";
const DEFAULT: &str = "#default";
const ERROR_COLUMN: &str = "error";

/// Per-table parsing state
#[derive(Default)]
struct Table {
    datatypes: Vec<String>,
    defaults: Vec<String>,
    header: Option<Vec<String>>,
}

impl Table {
    fn error_column(&self) -> Option<usize> {
        self.header
            .as_ref()?
            .iter()
            .position(|name| name == ERROR_COLUMN)
    }

    fn row(&self, header: &[String], record: &StringRecord) -> FluxRecord {
        let mut row = FluxRecord::default();
        for (index, name) in header.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            let mut raw = record.get(index).unwrap_or("");
            if raw.is_empty() {
                raw = self.defaults.get(index).map_or("", String::as_str);
            }
            let datatype = self.datatypes.get(index).map_or("string", String::as_str);
            row.insert(name.as_str(), parse_cell(raw, datatype));
        }
        row
    }
}

/// Parse a full response body into rows, in table order
pub fn parse(body: &str) -> Result<Vec<FluxRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    let mut table = Table::default();
    let mut in_annotations = false;

    for result in reader.records() {
        let record = result?;
        let first = record.get(0).unwrap_or("");

        if first.starts_with('#') {
            // A fresh annotation block starts a new table
            if !in_annotations {
                table = Table::default();
                in_annotations = true;
            }
            let values = record.iter().map(str::to_string).collect();
            match first {
                DATATYPE => table.datatypes = values,
                DEFAULT => table.defaults = values,
                _ => {}
            }
            continue;
        }
        in_annotations = false;

        if record.iter().all(str::is_empty) {
            continue;
        }

        if table.header.is_none() {
            table.header = Some(record.iter().map(str::to_string).collect());
            continue;
        }
        let Some(header) = table.header.as_ref() else {
            continue;
        };

        if let Some(index) = table.error_column() {
            let message = record.get(index).unwrap_or("").trim();
            if !message.is_empty() {
                return Err(Error::Query(message.to_string()));
            }
            continue;
        }

        if is_repeated_header(header, &record) {
            continue;
        }
        rows.push(table.row(header, &record));
    }

    Ok(rows)
}

/// Tables sharing a schema may repeat the header without annotations
fn is_repeated_header(header: &[String], record: &StringRecord) -> bool {
    header.len() == record.len() && header.iter().zip(record.iter()).all(|(h, r)| h == r)
}

fn parse_cell(raw: &str, datatype: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    let text = || Value::String(raw.to_string());
    match datatype {
        "long" => raw.parse::<i64>().map(Value::from).unwrap_or_else(|_| text()),
        "unsignedLong" => raw.parse::<u64>().map(Value::from).unwrap_or_else(|_| text()),
        "double" => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or_else(text, Value::Number),
        "boolean" => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => text(),
        },
        // dateTime:RFC3339, dateTime:RFC3339Nano, duration, base64Binary, string
        _ => text(),
    }
}
