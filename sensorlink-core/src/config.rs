// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Poller configuration.
//!
//! The defaults are the producer's fixed contract; there is no user-facing
//! configuration. Tests build configs with unique object names instead.
//! An invalid config is rejected before the poll thread starts.

use std::time::Duration;

use crate::error::ConfigError;
use crate::shm::layout::{MAPPING_SIZE, MAX_LABEL_LEN, SNAPSHOT_SIZE};
use crate::shm::SensorType;

/// Well-known name of the producer's shared memory object.
pub const DEFAULT_SHM_NAME: &str = "ARGUSMONITOR_DATA_INTERFACE";

/// Well-known name of the producer's named mutex.
pub const DEFAULT_MUTEX_NAME: &str = "ARGUSMONITOR_DATA_INTERFACE_MUTEX";

/// Label of the one sensor this bridge exposes.
pub const DEFAULT_SENSOR_LABEL: &str = "T Sensor";

fn default_poll_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(1)
}

/// Settings for the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Shared memory object name (without the leading /).
    pub shm_name: String,
    /// Named mutex guarding the sensor tables.
    pub mutex_name: String,
    /// Bytes to map; the object must be at least this large.
    pub region_size: usize,
    /// Label to look for.
    pub sensor_label: String,
    /// Category table to scan.
    pub sensor_type: SensorType,
    /// Delay between poll iterations.
    pub poll_interval: Duration,
    /// Upper bound on the mutex wait during locate.
    pub lock_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            shm_name: DEFAULT_SHM_NAME.to_string(),
            mutex_name: DEFAULT_MUTEX_NAME.to_string(),
            region_size: MAPPING_SIZE,
            sensor_label: DEFAULT_SENSOR_LABEL.to_string(),
            sensor_type: SensorType::Temperature,
            poll_interval: default_poll_interval(),
            lock_timeout: default_lock_timeout(),
        }
    }
}

impl PollerConfig {
    /// Validate every field, failing on the first bad one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::validate_name("shm_name", &self.shm_name)?;
        Self::validate_name("mutex_name", &self.mutex_name)?;

        if self.region_size < SNAPSHOT_SIZE {
            return Err(ConfigError::RegionTooSmall {
                size: self.region_size,
                required: SNAPSHOT_SIZE,
            });
        }

        if self.sensor_label.is_empty() {
            return Err(ConfigError::InvalidLabel {
                label: self.sensor_label.clone(),
                reason: "label cannot be empty".to_string(),
            });
        }
        let units = self.sensor_label.encode_utf16().count();
        if units >= MAX_LABEL_LEN {
            return Err(ConfigError::InvalidLabel {
                label: self.sensor_label.clone(),
                reason: format!("{} UTF-16 units, max {}", units, MAX_LABEL_LEN - 1),
            });
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }

        Ok(())
    }

    fn validate_name(field: &'static str, name: &str) -> Result<(), ConfigError> {
        let trimmed = name.strip_prefix('/').unwrap_or(name);
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyName { field });
        }
        if trimmed.contains('/') {
            return Err(ConfigError::InvalidName {
                field,
                name: name.to_string(),
                reason: "must not contain '/'",
            });
        }
        if trimmed.contains('\0') {
            return Err(ConfigError::InvalidName {
                field,
                name: name.to_string(),
                reason: "must not contain NUL",
            });
        }
        Ok(())
    }

    /// The target label as UTF-16 code units.
    pub fn label_utf16(&self) -> Vec<u16> {
        self.sensor_label.encode_utf16().collect()
    }
}
