// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Configuration, parsed from `fluxport.yaml`.

use crate::bucket::Bucket;
use crate::error::{Error, Result};
use crate::line_protocol::Precision;
use crate::writer::WriteTarget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "fluxport.yaml";

pub const ENV_URL: &str = "FLUXPORT_URL";
pub const ENV_TOKEN: &str = "FLUXPORT_TOKEN";
pub const ENV_ORG: &str = "FLUXPORT_ORG";
pub const ENV_OUTPUT: &str = "FLUXPORT_OUTPUT";

/// Top-level configuration.
///
/// ```yaml
/// store:
///   url: http://localhost:8086
///   token: "..."
///   org: home
///   timeout_seconds: 60
/// export:
///   enabled: true
///   output_folder: ./exports
///   buckets:
///     sensor_data: home_assistant
/// write:
///   bucket: sensor_data
///   precision: s
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FluxportConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub write: WriteConfig,
}

/// Connection settings of the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub org: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,
    /// Store bucket names overriding the category defaults
    #[serde(default)]
    pub buckets: BTreeMap<Bucket, String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_folder: default_output_folder(),
            buckets: BTreeMap::new(),
        }
    }
}

fn default_output_folder() -> PathBuf {
    PathBuf::from("./exports")
}

/// Destination of write-back; `bucket` is a category key or a literal bucket name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteConfig {
    #[serde(default = "default_write_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub precision: Precision,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            bucket: default_write_bucket(),
            precision: Precision::default(),
        }
    }
}

fn default_write_bucket() -> String {
    Bucket::SensorData.key().to_string()
}

impl FluxportConfig {
    /// Parse YAML text, without environment overrides
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml_ng::from_str(text)
            .map_err(|e| Error::configuration(format!("invalid configuration: {e}")))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable lookup; blank values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_URL) {
            self.store.url = url;
        }
        if let Some(token) = get(ENV_TOKEN) {
            self.store.token = token;
        }
        if let Some(org) = get(ENV_ORG) {
            self.store.org = org;
        }
        if let Some(output) = get(ENV_OUTPUT) {
            self.export.output_folder = PathBuf::from(output);
        }
    }

    /// Store bucket name of a category, honouring overrides
    #[must_use]
    pub fn bucket_name(&self, bucket: Bucket) -> String {
        self.export
            .buckets
            .get(&bucket)
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(bucket.default_bucket_name())
            .to_string()
    }

    /// Resolved write destination
    pub fn write_target(&self) -> Result<WriteTarget> {
        let configured = self.write.bucket.trim();
        if configured.is_empty() {
            return Err(Error::configuration("write.bucket must not be empty"));
        }
        let bucket = match configured.parse::<Bucket>() {
            Ok(category) => self.bucket_name(category),
            Err(_) => configured.to_string(),
        };
        Ok(WriteTarget {
            bucket,
            org: self.store.org.clone(),
            precision: self.write.precision,
        })
    }
}

/// Load configuration from a YAML file and apply environment overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FluxportConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::configuration(format!("failed to read config file {}: {e}", path.display()))
    })?;
    let mut config = FluxportConfig::from_yaml(&content)?;
    config.apply_env_overrides();
    Ok(config)
}

/// Store URL, token and organization must all be present
pub fn validate_store(store: &StoreConfig) -> Result<()> {
    let url = store.url.trim();
    if url.is_empty() {
        return Err(Error::configuration(format!(
            "store.url is not set (or set {ENV_URL})"
        )));
    }
    let parsed = Url::parse(url)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::configuration(format!(
            "store.url must be http or https, got '{url}'"
        )));
    }
    if store.token.trim().is_empty() {
        return Err(Error::configuration(format!(
            "store.token is not set (or set {ENV_TOKEN})"
        )));
    }
    if store.org.trim().is_empty() {
        return Err(Error::configuration(format!(
            "store.org is not set (or set {ENV_ORG})"
        )));
    }
    if store.timeout_seconds == Some(0) {
        return Err(Error::configuration("store.timeout_seconds must be greater than 0"));
    }
    Ok(())
}

/// Store settings plus the export switch
pub fn validate_export(config: &FluxportConfig) -> Result<()> {
    validate_store(&config.store)?;
    if !config.export.enabled {
        return Err(Error::configuration("export is disabled (export.enabled: false)"));
    }
    Ok(())
}

/// Starting configuration written by `fluxport init`
#[must_use]
pub fn create_example_config() -> String {
    r#"# fluxport configuration
store:
  url: http://localhost:8086
  # token can also come from FLUXPORT_TOKEN
  token: ""
  org: home
  timeout_seconds: 60

export:
  enabled: true
  output_folder: ./exports
  # store bucket names, when they differ from the defaults
  buckets:
    system_metrics: system_metrics
    sensor_data: sensor_data
    sensor_data_aggregated: sensor_data_30m
    costs: costs

write:
  bucket: sensor_data
  precision: s
"#
    .to_string()
}
