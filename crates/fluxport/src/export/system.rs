// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Host metrics (Telegraf `cpu`, `mem`, `disk`, ...)

use super::{BucketExport, ResolvedWindow};
use crate::bucket::Bucket;
use crate::config::FluxportConfig;
use crate::decode;
use crate::error::Result;
use crate::query::QueryBuilder;
use crate::record::SystemMetricsRecord;
use crate::registry::TAG_HOST;
use crate::row::FluxRecord;

/// Aggregate CPU line reported by Telegraf
const CPU_TOTAL: &str = "cpu-total";

#[derive(Debug, Clone)]
pub struct SystemMetricsExport {
    bucket: String,
}

impl SystemMetricsExport {
    #[must_use]
    pub fn new<S: Into<String>>(bucket: S) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &FluxportConfig) -> Self {
        Self::new(config.bucket_name(Bucket::SystemMetrics))
    }

    pub fn by_host(&self, window: &ResolvedWindow, host: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag(TAG_HOST, host))
    }

    pub fn by_measurement(&self, window: &ResolvedWindow, measurement: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.measurement(measurement))
    }

    /// Total CPU usage split into user, system and idle
    pub fn cpu_usage(&self, window: &ResolvedWindow, host: Option<&str>) -> Result<QueryBuilder> {
        let query = self
            .query(window)?
            .measurement("cpu")
            .fields(&["usage_user", "usage_system", "usage_idle"])
            .tag("cpu", CPU_TOTAL);
        Ok(match host {
            Some(host) => query.tag(TAG_HOST, host),
            None => query,
        })
    }

    pub fn memory_usage(&self, window: &ResolvedWindow) -> Result<QueryBuilder> {
        Ok(self
            .query(window)?
            .measurement("mem")
            .fields(&["used_percent", "available_percent"]))
    }

    /// Usage per mount point
    pub fn disk_usage(&self, window: &ResolvedWindow) -> Result<QueryBuilder> {
        Ok(self
            .query(window)?
            .measurement("disk")
            .fields(&["used_percent", "free", "total"]))
    }
}

impl BucketExport for SystemMetricsExport {
    type Record = SystemMetricsRecord;

    fn category(&self) -> Bucket {
        Bucket::SystemMetrics
    }

    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    fn decode(&self, row: &FluxRecord) -> Option<SystemMetricsRecord> {
        decode::decode_system(row)
    }
}
