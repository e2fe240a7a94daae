// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Sensor discovery inside a mapped snapshot.
//!
//! Validates the signature, then scans one category's slice of the record
//! array for the target label while holding the producer mutex.

use std::ptr::NonNull;
use std::time::Duration;

use crate::config::PollerConfig;
use crate::error::LocateError;
use crate::shm::layout::{label_matches, MAX_SENSOR_COUNT, SIGNATURE};
use crate::shm::{Attachment, SensorRecord, SensorType, SnapshotView};

/// Finds the configured sensor in a snapshot.
#[derive(Debug, Clone)]
pub struct SensorLocator {
    label: String,
    label_utf16: Vec<u16>,
    sensor_type: SensorType,
    lock_timeout: Duration,
}

impl SensorLocator {
    pub fn new(config: &PollerConfig) -> Self {
        Self {
            label: config.sensor_label.clone(),
            label_utf16: config.label_utf16(),
            sensor_type: config.sensor_type,
            lock_timeout: config.lock_timeout,
        }
    }

    /// Check the snapshot signature.
    ///
    /// A mismatch means the producer is absent or still initializing.
    pub fn validate(&self, snapshot: &SnapshotView<'_>) -> Result<(), LocateError> {
        let found = snapshot.signature();
        if found != SIGNATURE {
            return Err(LocateError::SignatureInvalid {
                expected: SIGNATURE,
                found,
            });
        }
        Ok(())
    }

    /// Validate, then scan for the first record whose label matches.
    ///
    /// The returned pointer stays valid for as long as the attachment is held.
    pub fn locate(&self, attachment: &Attachment) -> Result<NonNull<SensorRecord>, LocateError> {
        let snapshot = attachment.snapshot();
        self.validate(&snapshot)?;

        let _guard = attachment.mutex().lock(self.lock_timeout)?;
        let (offset, count) = snapshot.sensor_table(self.sensor_type);

        let end = (offset as usize)
            .checked_add(count as usize)
            .filter(|&end| end <= MAX_SENSOR_COUNT)
            .ok_or(LocateError::TableOutOfBounds {
                offset,
                count,
                capacity: MAX_SENSOR_COUNT,
            })?;

        for index in offset as usize..end {
            let Some(record) = snapshot.record(index) else {
                break;
            };
            // SAFETY: record lies inside the attachment's mapping
            let label = unsafe { SensorRecord::read_label(record.as_ptr()) };
            if label_matches(&label, &self.label_utf16) {
                tracing::debug!(
                    label = %self.label,
                    index = index,
                    "Located sensor"
                );
                return Ok(record);
            }
        }

        Err(LocateError::SensorNotFound {
            label: self.label.clone(),
        })
    }
}
