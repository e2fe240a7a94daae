// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Simulated producer for the sensor snapshot.
//!
//! Creates the shared memory object and named mutex under the configured
//! names and writes snapshots in the producer's layout. Used by tests and
//! local demos; the bridge itself never writes to the region.

use std::ptr;
use std::time::Duration;

use crate::config::PollerConfig;
use crate::error::ProducerError;
use crate::shm::layout::{
    encode_label, SensorRecord, SensorType, SnapshotView, CYCLE_COUNTER_OFFSET, MAX_LABEL_LEN,
    MAX_SENSOR_COUNT, MAX_UNIT_LEN, RECORDS_OFFSET, RECORD_SIZE, SENSOR_COUNTS_OFFSET,
    SENSOR_OFFSETS_OFFSET, SENSOR_TYPE_COUNT, SIGNATURE, SIGNATURE_OFFSET, TOTAL_COUNT_OFFSET,
    VERSION_OFFSET,
};
use crate::shm::mutex::NamedMutexGuard;
use crate::shm::region::{MappedView, ShmObject};
use crate::shm::NamedMutex;

/// Layout version written by [`ProducerRegion::publish`].
pub const PRODUCER_VERSION: u32 = 1;

/// A sensor to be written into the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedSensor<'a> {
    pub label: &'a str,
    pub unit: &'a str,
    pub value: f64,
}

impl<'a> SimulatedSensor<'a> {
    pub fn new(label: &'a str, unit: &'a str, value: f64) -> Self {
        Self { label, unit, value }
    }
}

/// Producer-side owner of the snapshot region and its mutex.
///
/// Both names are unlinked when this value drops, which is what a producer
/// exit looks like to an attached reader.
pub struct ProducerRegion {
    mutex: NamedMutex,
    view: MappedView,
    _object: ShmObject,
    lock_timeout: Duration,
}

impl ProducerRegion {
    /// Create a zero-filled region (signature unset) and an unlocked mutex.
    pub fn create(config: &PollerConfig) -> Result<Self, ProducerError> {
        let object = ShmObject::create(&config.shm_name, config.region_size)?;
        let view = MappedView::map_writable(&object, config.region_size)?;
        let mutex = NamedMutex::create(&config.mutex_name)?;

        tracing::debug!(name = %config.shm_name, "Simulated producer started");

        Ok(Self {
            mutex,
            view,
            _object: object,
            lock_timeout: config.lock_timeout,
        })
    }

    /// Read-only view of what the producer has written.
    pub fn snapshot(&self) -> SnapshotView<'_> {
        self.view.snapshot()
    }

    fn write_u32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= RECORDS_OFFSET);
        // SAFETY: header offsets are 4-aligned and inside the writable mapping
        unsafe { ptr::write_volatile(self.view.as_ptr().add(offset) as *mut u32, value) };
    }

    fn record_ptr(&self, index: usize) -> Result<*mut SensorRecord, ProducerError> {
        if index >= MAX_SENSOR_COUNT {
            return Err(ProducerError::RecordOutOfRange {
                index,
                capacity: MAX_SENSOR_COUNT,
            });
        }
        // SAFETY: index is within the record array
        Ok(unsafe { self.view.as_ptr().add(RECORDS_OFFSET + index * RECORD_SIZE) }
            as *mut SensorRecord)
    }

    /// Acquire the producer mutex, as the producer does while rewriting tables.
    pub fn lock(&self) -> Result<NamedMutexGuard<'_>, ProducerError> {
        Ok(self.mutex.lock(self.lock_timeout)?)
    }

    /// Mark the snapshot initialized.
    pub fn publish(&self) {
        self.write_u32(VERSION_OFFSET, PRODUCER_VERSION);
        self.write_u32(SIGNATURE_OFFSET, SIGNATURE);
    }

    /// Overwrite the cycle counter.
    pub fn set_cycle_counter(&self, counter: u32) {
        self.write_u32(CYCLE_COUNTER_OFFSET, counter);
    }

    /// Increment the cycle counter, returning the new value.
    pub fn advance_cycle(&self) -> u32 {
        let next = self.snapshot().cycle_counter().wrapping_add(1);
        self.set_cycle_counter(next);
        next
    }

    /// Overwrite one category's table entry without touching records.
    pub fn set_table(&self, sensor_type: SensorType, offset: u32, count: u32) {
        let index = sensor_type.index();
        self.write_u32(SENSOR_OFFSETS_OFFSET + 4 * index, offset);
        self.write_u32(SENSOR_COUNTS_OFFSET + 4 * index, count);
    }

    /// Lay out the sensor tables from scratch.
    ///
    /// Categories are written back to back from record 0 in the given order,
    /// under the producer mutex.
    pub fn write_sensors(
        &self,
        categories: &[(SensorType, &[SimulatedSensor<'_>])],
    ) -> Result<(), ProducerError> {
        let _guard = self.lock()?;

        for index in 0..SENSOR_TYPE_COUNT {
            self.write_u32(SENSOR_OFFSETS_OFFSET + 4 * index, 0);
            self.write_u32(SENSOR_COUNTS_OFFSET + 4 * index, 0);
        }

        let mut next = 0usize;
        for (sensor_type, sensors) in categories {
            let offset = next;
            for sensor in sensors.iter() {
                self.write_record(next, *sensor_type, sensor)?;
                next += 1;
            }
            self.set_table(*sensor_type, offset as u32, sensors.len() as u32);
        }
        self.write_u32(TOTAL_COUNT_OFFSET, next as u32);

        tracing::trace!(records = next, "Simulated producer wrote sensor tables");
        Ok(())
    }

    fn write_record(
        &self,
        index: usize,
        sensor_type: SensorType,
        sensor: &SimulatedSensor<'_>,
    ) -> Result<(), ProducerError> {
        let label: [u16; MAX_LABEL_LEN] =
            encode_label(sensor.label).ok_or_else(|| ProducerError::LabelTooLong {
                label: sensor.label.to_string(),
                max: MAX_LABEL_LEN - 1,
            })?;
        let unit: [u16; MAX_UNIT_LEN] =
            encode_label(sensor.unit).ok_or_else(|| ProducerError::LabelTooLong {
                label: sensor.unit.to_string(),
                max: MAX_UNIT_LEN - 1,
            })?;

        let record = self.record_ptr(index)?;
        // SAFETY: record points at a record slot inside the writable mapping
        unsafe {
            ptr::write_unaligned(
                record,
                SensorRecord {
                    sensor_type: sensor_type as u32,
                    label,
                    unit,
                    value: sensor.value,
                    data_index: index as u32,
                    sensor_index: index as u32,
                },
            );
        }
        Ok(())
    }

    /// Update the value of an already-written record.
    pub fn set_value(&self, index: usize, value: f64) -> Result<(), ProducerError> {
        let record = self.record_ptr(index)?;
        // SAFETY: record points at a record slot inside the writable mapping
        unsafe { ptr::write_unaligned(ptr::addr_of_mut!((*record).value), value) };
        Ok(())
    }

    /// Zero the whole snapshot, as the producer does on graceful shutdown.
    pub fn zero_fill(&self) {
        // SAFETY: the mapping is writable for its full length
        unsafe { ptr::write_bytes(self.view.as_ptr(), 0, self.view.len()) };
    }

    /// Simulate a restart in place: zero fill, reset the counter to 0, lay out
    /// the new tables and publish.
    pub fn restart(
        &self,
        categories: &[(SensorType, &[SimulatedSensor<'_>])],
    ) -> Result<(), ProducerError> {
        self.zero_fill();
        self.set_cycle_counter(0);
        self.write_sensors(categories)?;
        self.publish();
        tracing::debug!("Simulated producer restarted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::layout::{label_matches, SensorRecord};
    use crate::test_support::unique_config;

    #[test]
    fn test_create_starts_unpublished() {
        let config = unique_config("producer-new");
        let producer = ProducerRegion::create(&config).unwrap();
        let snapshot = producer.snapshot();
        assert!(!snapshot.is_valid());
        assert_eq!(snapshot.cycle_counter(), 0);
    }

    #[test]
    fn test_create_twice_fails() {
        let config = unique_config("producer-dup");
        let _producer = ProducerRegion::create(&config).unwrap();
        assert!(matches!(
            ProducerRegion::create(&config),
            Err(ProducerError::CreateFailed { .. })
        ));
    }

    #[test]
    fn test_write_sensors_lays_out_categories() {
        let config = unique_config("producer-layout");
        let producer = ProducerRegion::create(&config).unwrap();
        let fans = [SimulatedSensor::new("Fan 1", "rpm", 900.0)];
        let temps = [
            SimulatedSensor::new("CPU", "C", 55.0),
            SimulatedSensor::new("T Sensor", "C", 31.0),
        ];

        producer
            .write_sensors(&[
                (SensorType::FanSpeedRpm, &fans[..]),
                (SensorType::Temperature, &temps[..]),
            ])
            .unwrap();
        producer.publish();

        let snapshot = producer.snapshot();
        assert!(snapshot.is_valid());
        assert_eq!(snapshot.version(), PRODUCER_VERSION);
        assert_eq!(snapshot.total_sensor_count(), 3);
        assert_eq!(snapshot.sensor_table(SensorType::FanSpeedRpm), (0, 1));
        assert_eq!(snapshot.sensor_table(SensorType::Temperature), (1, 2));

        let record = snapshot.record(2).unwrap().as_ptr();
        let target: Vec<u16> = "T Sensor".encode_utf16().collect();
        unsafe {
            assert!(label_matches(&SensorRecord::read_label(record), &target));
            assert_eq!(SensorRecord::read_value(record), 31.0);
        }

        producer.set_value(2, 33.5).unwrap();
        assert_eq!(unsafe { SensorRecord::read_value(record) }, 33.5);
    }

    #[test]
    fn test_label_too_long() {
        let config = unique_config("producer-label");
        let producer = ProducerRegion::create(&config).unwrap();
        let label = "x".repeat(MAX_LABEL_LEN);
        let sensors = [SimulatedSensor::new(&label, "C", 1.0)];

        assert!(matches!(
            producer.write_sensors(&[(SensorType::Temperature, &sensors[..])]),
            Err(ProducerError::LabelTooLong { .. })
        ));
    }

    #[test]
    fn test_restart_resets_counter() {
        let config = unique_config("producer-restart");
        let producer = ProducerRegion::create(&config).unwrap();
        producer.set_cycle_counter(41);
        assert_eq!(producer.advance_cycle(), 42);

        producer.restart(&[]).unwrap();
        let snapshot = producer.snapshot();
        assert_eq!(snapshot.cycle_counter(), 0);
        assert!(snapshot.is_valid());
        assert_eq!(snapshot.total_sensor_count(), 0);
    }
}
