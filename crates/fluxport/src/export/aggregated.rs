// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Pre-aggregated sensor readings (30 minute windows by default)

use super::{BucketExport, ResolvedWindow};
use crate::bucket::Bucket;
use crate::config::FluxportConfig;
use crate::decode;
use crate::error::Result;
use crate::query::QueryBuilder;
use crate::record::AggregatedSensorRecord;
use crate::registry::{TAG_DEVICE_CLASS, TAG_ENTITY_ID};
use crate::row::FluxRecord;

#[derive(Debug, Clone)]
pub struct AggregatedSensorExport {
    bucket: String,
}

impl AggregatedSensorExport {
    #[must_use]
    pub fn new<S: Into<String>>(bucket: S) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &FluxportConfig) -> Self {
        Self::new(config.bucket_name(Bucket::SensorDataAggregated))
    }

    pub fn by_entity(&self, window: &ResolvedWindow, entity_id: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag(TAG_ENTITY_ID, entity_id))
    }

    pub fn by_device_class(&self, window: &ResolvedWindow, class: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag(TAG_DEVICE_CLASS, class))
    }

    /// One summary series: `mean`, `min`, `max`, ...
    pub fn by_statistic(&self, window: &ResolvedWindow, statistic: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.field(statistic))
    }

    /// Daily means rebuilt from the stored window means
    pub fn daily_rollup(&self, window: &ResolvedWindow) -> Result<QueryBuilder> {
        Ok(self.query(window)?.field("mean").time_window("1d", "mean"))
    }
}

impl BucketExport for AggregatedSensorExport {
    type Record = AggregatedSensorRecord;

    fn category(&self) -> Bucket {
        Bucket::SensorDataAggregated
    }

    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    fn decode(&self, row: &FluxRecord) -> Option<AggregatedSensorRecord> {
        decode::decode_aggregated(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportWindow;
    use chrono::{TimeZone, Utc};

    fn window() -> ResolvedWindow {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        ExportWindow::default().resolve(now).unwrap()
    }

    #[test]
    fn daily_rollup_reaggregates_means() {
        let query = AggregatedSensorExport::new("sensor_data_30m")
            .daily_rollup(&window())
            .unwrap()
            .build();
        assert!(query.contains("filter(fn: (r) => (r._field == \"mean\"))"), "{query}");
        assert!(query.ends_with("|> aggregateWindow(every: 1d, fn: mean, createEmpty: false)"));
    }

    #[test]
    fn statistic_and_tag_filters() {
        let strategy = AggregatedSensorExport::new("sensor_data_30m");
        let w = window();
        assert!(strategy.by_statistic(&w, "max").unwrap().build()
            .contains("(r._field == \"max\")"));
        assert!(strategy.by_entity(&w, "sensor.boiler").unwrap().build()
            .contains("(r.entity_id == \"sensor.boiler\")"));
        assert!(strategy.by_device_class(&w, "energy").unwrap().build()
            .contains("(r.device_class == \"energy\")"));
    }
}
