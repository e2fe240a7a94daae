// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lock-free handoff of the located sensor to the host thread.
//!
//! The poll thread is the only writer; any thread may read. Loads and stores
//! are relaxed: no other state is ordered against the pointer, and the value
//! it points at is a single producer-written f64.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::shm::SensorRecord;

/// Raw record value meaning "no reading" (the producer zero-fills on exit).
pub const NO_DATA: f64 = 0.0;

/// Pointer to the last located sensor record, or null.
#[derive(Debug)]
pub struct ValueHandoff {
    record: AtomicPtr<SensorRecord>,
}

impl Default for ValueHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueHandoff {
    pub const fn new() -> Self {
        Self {
            record: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Publish a freshly located record.
    ///
    /// # Safety
    /// `record` must point to a readable [`SensorRecord`], and its memory must
    /// stay valid until after [`ValueHandoff::clear`] and until any reader
    /// that loaded the pointer beforehand has finished.
    pub unsafe fn publish(&self, record: NonNull<SensorRecord>) {
        self.record.store(record.as_ptr(), Ordering::Relaxed);
    }

    /// Withdraw the published record.
    pub fn clear(&self) {
        self.record.store(ptr::null_mut(), Ordering::Relaxed);
    }

    /// Whether a record is currently published.
    pub fn is_published(&self) -> bool {
        !self.record.load(Ordering::Relaxed).is_null()
    }

    /// Latest sensor reading, or `None` when nothing is located or the
    /// producer reports no data.
    pub fn read(&self) -> Option<f64> {
        let record = self.record.load(Ordering::Relaxed);
        if record.is_null() {
            return None;
        }

        // SAFETY: `publish` requires the record to outlive its publication
        let value = unsafe { SensorRecord::read_value(record) };
        (value != NO_DATA).then_some(value)
    }
}
