// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for export and import operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid store settings, or exports switched off
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Query execution failed for one bucket
    #[error("Export of bucket '{bucket}' failed: {source}")]
    ExportFailure {
        bucket: String,
        #[source]
        source: Box<Error>,
    },

    /// Caller mistakes detected before any I/O
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from store: {body}")]
    Http { status: u16, body: String },

    /// The store answered with an error table
    #[error("Query error: {0}")]
    Query(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Wrap a store failure with the bucket it happened in
    pub fn export_failure<S: Into<String>>(bucket: S, source: Error) -> Self {
        Error::ExportFailure {
            bucket: bucket.into(),
            source: Box::new(source),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Configuration(format!("invalid store URL: {e}"))
    }
}

/// Result type for fluxport operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_failure_names_bucket() {
        let err = Error::export_failure("costs", Error::Transport("connection refused".into()));
        let msg = err.to_string();
        assert!(msg.contains("'costs'"));
        assert!(msg.contains("connection refused"));
    }
}
