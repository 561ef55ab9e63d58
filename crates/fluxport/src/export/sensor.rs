// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Raw sensor readings, one measurement per unit

use super::{BucketExport, ResolvedWindow};
use crate::bucket::Bucket;
use crate::config::FluxportConfig;
use crate::decode;
use crate::error::Result;
use crate::query::QueryBuilder;
use crate::record::SensorRecord;
use crate::registry::{TAG_DEVICE_CLASS, TAG_ENTITY_ID, TAG_LOCATION};
use crate::row::FluxRecord;

/// Entity ids of Xiaomi/Aqara Zigbee sensors
pub const XIAOMI_ENTITY_PATTERN: &str = r"^sensor\.(lumi|xiaomi|aqara|mijia)_";

/// Entity ids of Tasmota-flashed devices
pub const TASMOTA_ENTITY_PATTERN: &str = r"^(sensor|switch)\.tasmota_";

const CLIMATE_FIELDS: [&str; 3] = ["temperature", "humidity", "pressure"];

#[derive(Debug, Clone)]
pub struct SensorExport {
    bucket: String,
}

impl SensorExport {
    #[must_use]
    pub fn new<S: Into<String>>(bucket: S) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &FluxportConfig) -> Self {
        Self::new(config.bucket_name(Bucket::SensorData))
    }

    pub fn by_entity(&self, window: &ResolvedWindow, entity_id: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag(TAG_ENTITY_ID, entity_id))
    }

    pub fn by_location(&self, window: &ResolvedWindow, location: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag(TAG_LOCATION, location))
    }

    pub fn by_device_class(&self, window: &ResolvedWindow, class: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag(TAG_DEVICE_CLASS, class))
    }

    pub fn xiaomi_sensors(&self, window: &ResolvedWindow) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag_regex(TAG_ENTITY_ID, XIAOMI_ENTITY_PATTERN))
    }

    pub fn tasmota_devices(&self, window: &ResolvedWindow) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag_regex(TAG_ENTITY_ID, TASMOTA_ENTITY_PATTERN))
    }

    /// Temperature, humidity and pressure readings
    pub fn climate(&self, window: &ResolvedWindow) -> Result<QueryBuilder> {
        Ok(self.query(window)?.fields(&CLIMATE_FIELDS))
    }

    /// The store files readings under their unit, e.g. `°C` or `kWh`
    pub fn by_unit(&self, window: &ResolvedWindow, unit: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.measurement(unit))
    }
}

impl BucketExport for SensorExport {
    type Record = SensorRecord;

    fn category(&self) -> Bucket {
        Bucket::SensorData
    }

    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    fn decode(&self, row: &FluxRecord) -> Option<SensorRecord> {
        decode::decode_sensor(row)
    }
}
