// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Binary layout of the producer's sensor snapshot.
//!
//! The snapshot is a packed, little-endian structure written by the producer
//! and mapped read-only here:
//!
//! ```text
//! +-----------+-------+-------+---------+-------+-----------+----------+-------+-----------------+
//! | signature | ver.  | build | version | cycle | offsets   | counts   | total | records         |
//! | u32       | 4 x u8| u32   | u32     | u32   | 26 x u32  | 26 x u32 | u32   | 512 x 212 bytes |
//! +-----------+-------+-------+---------+-------+-----------+----------+-------+-----------------+
//! ```
//!
//! Every header field sits on a 4-byte boundary of the (page-aligned) mapping.
//! Record values do not, so they are always read unaligned.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};

/// Magic value marking an initialized snapshot (`"ArgM"` little-endian).
pub const SIGNATURE: u32 = 0x4D67_7241;

/// Fixed size of the producer's mapping.
pub const MAPPING_SIZE: usize = 1024 * 1024;

/// Capacity of the flat sensor record array.
pub const MAX_SENSOR_COUNT: usize = 512;

/// Label length in UTF-16 code units, including the terminating NUL.
pub const MAX_LABEL_LEN: usize = 64;

/// Unit string length in UTF-16 code units, including the terminating NUL.
pub const MAX_UNIT_LEN: usize = 32;

/// Number of sensor categories in the offset/count tables.
pub const SENSOR_TYPE_COUNT: usize = 26;

pub(crate) const SIGNATURE_OFFSET: usize = 0;
pub(crate) const VERSION_OFFSET: usize = 12;
pub(crate) const CYCLE_COUNTER_OFFSET: usize = 16;
pub(crate) const SENSOR_OFFSETS_OFFSET: usize = 20;
pub(crate) const SENSOR_COUNTS_OFFSET: usize = SENSOR_OFFSETS_OFFSET + 4 * SENSOR_TYPE_COUNT;
pub(crate) const TOTAL_COUNT_OFFSET: usize = SENSOR_COUNTS_OFFSET + 4 * SENSOR_TYPE_COUNT;
pub(crate) const RECORDS_OFFSET: usize = TOTAL_COUNT_OFFSET + 4;

/// Size of one packed [`SensorRecord`].
pub const RECORD_SIZE: usize = std::mem::size_of::<SensorRecord>();

/// Bytes of the mapping actually covered by the snapshot structure.
pub const SNAPSHOT_SIZE: usize = RECORDS_OFFSET + MAX_SENSOR_COUNT * RECORD_SIZE;

const _: () = assert!(RECORD_SIZE == 212);
const _: () = assert!(RECORDS_OFFSET == 232);
const _: () = assert!(SNAPSHOT_SIZE <= MAPPING_SIZE);

/// Sensor categories used to index the offset/count tables.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    Invalid = 0,
    Temperature,
    SyntheticTemperature,
    FanSpeedRpm,
    FanControlValue,
    NetworkSpeed,
    CpuTemperature,
    CpuTemperatureAdditional,
    CpuMultiplier,
    CpuFrequencyFsb,
    GpuTemperature,
    GpuName,
    GpuLoad,
    GpuCoreClock,
    GpuMemoryClock,
    GpuShaderClock,
    GpuFanSpeedPercent,
    GpuFanSpeedRpm,
    GpuMemoryUsedPercent,
    GpuMemoryUsedMb,
    GpuPower,
    DiskTemperature,
    DiskTransferRate,
    CpuLoad,
    RamUsage,
    Battery,
}

const _: () = assert!(SensorType::Battery as usize + 1 == SENSOR_TYPE_COUNT);

impl SensorType {
    /// Index into the per-category tables.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// One entry of the producer's sensor array.
///
/// Only ever accessed through raw pointers into the mapping; the packed
/// layout means fields must not be borrowed.
#[repr(C, packed)]
pub struct SensorRecord {
    pub sensor_type: u32,
    pub label: [u16; MAX_LABEL_LEN],
    pub unit: [u16; MAX_UNIT_LEN],
    pub value: f64,
    pub data_index: u32,
    pub sensor_index: u32,
}

impl SensorRecord {
    /// Read the current value of a record living in a mapping.
    ///
    /// # Safety
    /// `record` must point into a live mapping of at least [`SNAPSHOT_SIZE`] bytes.
    pub unsafe fn read_value(record: *const SensorRecord) -> f64 {
        ptr::read_unaligned(ptr::addr_of!((*record).value))
    }

    /// Read the label of a record living in a mapping.
    ///
    /// # Safety
    /// Same requirements as [`SensorRecord::read_value`].
    pub unsafe fn read_label(record: *const SensorRecord) -> [u16; MAX_LABEL_LEN] {
        ptr::read_unaligned(ptr::addr_of!((*record).label))
    }
}

/// Encode a label as a NUL-terminated UTF-16 buffer.
///
/// Returns `None` if the label (plus terminator) does not fit.
pub fn encode_label<const N: usize>(label: &str) -> Option<[u16; N]> {
    let mut buf = [0u16; N];
    let mut len = 0;
    for unit in label.encode_utf16() {
        if len + 1 >= N {
            return None;
        }
        buf[len] = unit;
        len += 1;
    }
    Some(buf)
}

/// Compare a raw label buffer against a target, up to the first NUL.
pub fn label_matches(raw: &[u16], target: &[u16]) -> bool {
    let end = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    &raw[..end] == target
}

/// Read-only view of a mapped snapshot.
///
/// Borrows the mapping it was created from, so it cannot outlive a detach.
#[derive(Clone, Copy)]
pub struct SnapshotView<'a> {
    base: NonNull<u8>,
    _mapping: PhantomData<&'a [u8]>,
}

impl<'a> SnapshotView<'a> {
    /// Create a view over a mapping.
    ///
    /// # Safety
    /// `base` must be 4-byte aligned and valid for reads of [`SNAPSHOT_SIZE`]
    /// bytes for the lifetime `'a`.
    pub(crate) unsafe fn from_raw(base: NonNull<u8>) -> Self {
        debug_assert_eq!(base.as_ptr() as usize % 4, 0);
        Self {
            base,
            _mapping: PhantomData,
        }
    }

    fn read_u32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= RECORDS_OFFSET);
        // SAFETY: header offsets are 4-aligned and inside SNAPSHOT_SIZE.
        // Volatile because the producer rewrites the header concurrently.
        unsafe { ptr::read_volatile(self.base.as_ptr().add(offset) as *const u32) }
    }

    /// Magic signature field.
    pub fn signature(&self) -> u32 {
        self.read_u32(SIGNATURE_OFFSET)
    }

    /// Whether the producer has finished initializing the snapshot.
    pub fn is_valid(&self) -> bool {
        self.signature() == SIGNATURE
    }

    /// Producer update counter.
    pub fn cycle_counter(&self) -> u32 {
        self.read_u32(CYCLE_COUNTER_OFFSET)
    }

    /// Layout version written by the producer.
    pub fn version(&self) -> u32 {
        self.read_u32(VERSION_OFFSET)
    }

    /// Total number of populated records across all categories.
    pub fn total_sensor_count(&self) -> u32 {
        self.read_u32(TOTAL_COUNT_OFFSET)
    }

    /// `(offset, count)` of a category's slice of the record array.
    pub fn sensor_table(&self, sensor_type: SensorType) -> (u32, u32) {
        let index = sensor_type.index();
        (
            self.read_u32(SENSOR_OFFSETS_OFFSET + 4 * index),
            self.read_u32(SENSOR_COUNTS_OFFSET + 4 * index),
        )
    }

    /// Pointer to record `index` of the flat array.
    pub fn record(&self, index: usize) -> Option<NonNull<SensorRecord>> {
        if index >= MAX_SENSOR_COUNT {
            return None;
        }
        // SAFETY: index < MAX_SENSOR_COUNT keeps the record inside SNAPSHOT_SIZE.
        let ptr = unsafe {
            self.base
                .as_ptr()
                .add(RECORDS_OFFSET + index * RECORD_SIZE)
        };
        NonNull::new(ptr as *mut SensorRecord)
    }
}
