// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The four bucket categories the exporter understands.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a store bucket; each one has its own record shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    SystemMetrics,
    SensorData,
    SensorDataAggregated,
    Costs,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::SystemMetrics,
        Bucket::SensorData,
        Bucket::SensorDataAggregated,
        Bucket::Costs,
    ];

    /// Configuration key, also accepted by `FromStr`
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Bucket::SystemMetrics => "system_metrics",
            Bucket::SensorData => "sensor_data",
            Bucket::SensorDataAggregated => "sensor_data_aggregated",
            Bucket::Costs => "costs",
        }
    }

    /// Store bucket name used when the configuration does not override it
    #[must_use]
    pub fn default_bucket_name(self) -> &'static str {
        match self {
            Bucket::SystemMetrics => "system_metrics",
            Bucket::SensorData => "sensor_data",
            Bucket::SensorDataAggregated => "sensor_data_30m",
            Bucket::Costs => "costs",
        }
    }

    /// Prefix of the export file names
    #[must_use]
    pub fn file_prefix(self) -> &'static str {
        match self {
            Bucket::SystemMetrics => "system_metrics",
            Bucket::SensorData => "sensor_data",
            Bucket::SensorDataAggregated => "sensor_data_aggregated",
            Bucket::Costs => "costs",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Bucket {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "system_metrics" | "system" => Ok(Bucket::SystemMetrics),
            "sensor_data" | "sensor" | "sensors" => Ok(Bucket::SensorData),
            "sensor_data_aggregated" | "aggregated" | "sensor_data_30m" => {
                Ok(Bucket::SensorDataAggregated)
            }
            "costs" | "cost" => Ok(Bucket::Costs),
            _ => Err(Error::invalid_argument(format!(
                "unknown bucket '{s}', expected one of: system_metrics, sensor_data, sensor_data_aggregated, costs"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_and_aliases() {
        for bucket in Bucket::ALL {
            assert_eq!(bucket.key().parse::<Bucket>().unwrap(), bucket);
        }
        assert_eq!("Sensor-Data".parse::<Bucket>().unwrap(), Bucket::SensorData);
        assert_eq!("SENSOR_DATA_AGGREGATED".parse::<Bucket>().unwrap(), Bucket::SensorDataAggregated);
    }

    #[test]
    fn rejects_unknown_bucket() {
        let err = "weather".parse::<Bucket>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
