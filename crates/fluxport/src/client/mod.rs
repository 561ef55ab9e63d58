// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Store client
//!
//! [`TimeSeriesStore`] is the seam between the export/import logic and the
//! store; [`InfluxClient`] speaks the InfluxDB 2.x HTTP API.

pub mod annotated;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::row::FluxRecord;
use crate::writer::WriteTarget;
use async_trait::async_trait;
use diagnostics::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const TIMEOUT_SECONDS: u64 = 60;

const QUERY_PATH: &str = "/api/v2/query";
const WRITE_PATH: &str = "/api/v2/write";
const HEALTH_PATH: &str = "/health";

/// Query and write access to a time-series store
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Run a Flux query and return its rows in table order
    async fn query(&self, flux: &str) -> Result<Vec<FluxRecord>>;

    /// Write newline-separated line protocol
    async fn write(&self, target: &WriteTarget, lines: String) -> Result<()>;
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    dialect: Dialect,
}

#[derive(Serialize)]
struct Dialect {
    header: bool,
    delimiter: &'static str,
    annotations: [&'static str; 3],
}

impl<'a> QueryRequest<'a> {
    fn flux(query: &'a str) -> Self {
        Self {
            query,
            kind: "flux",
            dialect: Dialect {
                header: true,
                delimiter: ",",
                annotations: ["datatype", "group", "default"],
            },
        }
    }
}

/// Error body of a failed API call
#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// `GET /health` answer
#[derive(Deserialize, Debug, Clone)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Async client for an InfluxDB 2.x compatible store
pub struct InfluxClient {
    http_client: reqwest::Client,
    base_url: Url,
    token: String,
    org: String,
}

impl InfluxClient {
    /// Build a client from validated store settings
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let base_url = Url::parse(config.url.trim())?;
        let timeout = config.timeout_seconds.unwrap_or(TIMEOUT_SECONDS);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .gzip(true)
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            token: config.token.clone(),
            org: config.org.clone(),
        })
    }

    #[must_use]
    pub fn org(&self) -> &str {
        &self.org
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check that the store is up; needs no token
    pub async fn health(&self) -> Result<Health> {
        let url = self.endpoint(HEALTH_PATH, &[])?;
        let response = self.http_client.get(url).send().await?;
        let body = Self::read_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Names of the buckets visible to the token
    pub async fn bucket_names(&self) -> Result<Vec<String>> {
        let rows = self.query("buckets()").await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get_str("name").map(str::to_string))
            .collect())
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{path}"))?;
        if !params.is_empty() {
            _ = url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.token)
    }

    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }
        let body = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        Err(Error::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxClient {
    async fn query(&self, flux: &str) -> Result<Vec<FluxRecord>> {
        let url = self.endpoint(QUERY_PATH, &[("org", self.org.as_str())])?;
        let payload = serde_json::to_string(&QueryRequest::flux(flux))?;
        debug!("Posting query to {url}", url: url.as_str());

        let response = self
            .http_client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .header(reqwest::header::ACCEPT, "application/csv")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        let body = Self::read_body(response).await?;

        let rows = annotated::parse(&body)?;
        let count = rows.len();
        debug!("Query returned {count} rows");
        Ok(rows)
    }

    async fn write(&self, target: &WriteTarget, lines: String) -> Result<()> {
        let precision = target.precision.as_str();
        let url = self.endpoint(
            WRITE_PATH,
            &[
                ("org", target.org.as_str()),
                ("bucket", target.bucket.as_str()),
                ("precision", precision),
            ],
        )?;

        let response = self
            .http_client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(lines)
            .send()
            .await?;
        _ = Self::read_body(response).await?;
        Ok(())
    }
}
