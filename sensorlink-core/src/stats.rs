// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::poller::PollState;

/// Counters updated by the poll thread and readable from any thread.
#[derive(Debug, Default)]
pub struct PollerMetrics {
    ticks: AtomicU64,
    attach_attempts: AtomicU64,
    attach_failures: AtomicU64,
    orphaned_detaches: AtomicU64,
    restarts_detected: AtomicU64,
    locate_runs: AtomicU64,
    sensors_found: AtomicU64,
    state: AtomicU8,
}

impl PollerMetrics {
    pub fn record_tick(&self, state: PollState) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn record_attach(&self, ok: bool) {
        self.attach_attempts.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.attach_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_orphaned(&self) {
        self.orphaned_detaches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.restarts_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_locate(&self, found: bool) {
        self.locate_runs.fetch_add(1, Ordering::Relaxed);
        if found {
            self.sensors_found.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_state(&self, state: PollState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> PollerStats {
        PollerStats {
            state: PollState::from_u8(self.state.load(Ordering::Relaxed)),
            ticks: self.ticks.load(Ordering::Relaxed),
            attach_attempts: self.attach_attempts.load(Ordering::Relaxed),
            attach_failures: self.attach_failures.load(Ordering::Relaxed),
            orphaned_detaches: self.orphaned_detaches.load(Ordering::Relaxed),
            restarts_detected: self.restarts_detected.load(Ordering::Relaxed),
            locate_runs: self.locate_runs.load(Ordering::Relaxed),
            sensors_found: self.sensors_found.load(Ordering::Relaxed),
        }
    }
}

/// Serializable poller statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerStats {
    pub state: PollState,
    pub ticks: u64,
    pub attach_attempts: u64,
    pub attach_failures: u64,
    pub orphaned_detaches: u64,
    pub restarts_detected: u64,
    pub locate_runs: u64,
    pub sensors_found: u64,
}
