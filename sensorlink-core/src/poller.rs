// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Poll loop state machine.
//!
//! Detached → Attaching → AttachedNoSensor | AttachedWithSensor, plus the
//! terminal Stopped. One call to [`PollLoop::tick`] is one poll iteration.
//! Errors never leave a tick; they leave the loop in a state that retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::PollerConfig;
use crate::error::LocateError;
use crate::handoff::ValueHandoff;
use crate::locator::SensorLocator;
use crate::shm::{Attachment, RegionHandle};
use crate::stats::PollerMetrics;

/// Upper bound on one sleep slice, so a stop request is seen promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// Poll loop states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollState {
    /// No producer region held; attach is retried every tick.
    Detached = 0,

    /// Attached, but the sensor must be (re-)located.
    Attaching = 1,

    /// Snapshot valid, table scanned, no matching sensor.
    AttachedNoSensor = 2,

    /// Sensor located and published.
    AttachedWithSensor = 3,

    /// Loop exited after a stop request.
    Stopped = 4,
}

impl PollState {
    /// Get the state name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Detached => "Detached",
            Self::Attaching => "Attaching",
            Self::AttachedNoSensor => "AttachedNoSensor",
            Self::AttachedWithSensor => "AttachedWithSensor",
            Self::Stopped => "Stopped",
        }
    }

    /// Whether the table has been checked since the last (re)start.
    pub fn is_data_available(&self) -> bool {
        matches!(self, Self::AttachedNoSensor | Self::AttachedWithSensor)
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Attaching,
            2 => Self::AttachedNoSensor,
            3 => Self::AttachedWithSensor,
            4 => Self::Stopped,
            _ => Self::Detached,
        }
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Owns the region handle and drives attach, restart detection and locate.
pub struct PollLoop {
    config: PollerConfig,
    region: RegionHandle,
    locator: SensorLocator,
    handoff: Arc<ValueHandoff>,
    metrics: Arc<PollerMetrics>,
    state: PollState,
    last_cycle_counter: u32,
    /// Orphaned attachment kept mapped for one more interval, so a reader
    /// that loaded the pointer before it was cleared can finish.
    retired: Option<Attachment>,
}

impl PollLoop {
    pub fn new(
        config: PollerConfig,
        handoff: Arc<ValueHandoff>,
        metrics: Arc<PollerMetrics>,
    ) -> Self {
        let locator = SensorLocator::new(&config);
        Self {
            config,
            region: RegionHandle::new(),
            locator,
            handoff,
            metrics,
            state: PollState::Detached,
            last_cycle_counter: 0,
            retired: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Cycle counter recorded at the last (re)locate.
    pub fn last_cycle_counter(&self) -> u32 {
        self.last_cycle_counter
    }

    /// The region handle owned by this loop.
    pub fn region(&self) -> &RegionHandle {
        &self.region
    }

    fn transition(&mut self, next: PollState) {
        if next != self.state {
            tracing::debug!(from = self.state.name(), to = next.name(), "Poll state transition");
            self.state = next;
        }
    }

    /// Run one poll iteration and return the resulting state.
    pub fn tick(&mut self) -> PollState {
        self.release_retired();
        self.check_orphaned();

        if !self.region.is_attached() {
            let attached = match self.region.attach(&self.config) {
                Ok(()) => true,
                Err(e) => {
                    tracing::trace!(error = %e, "Attach failed, retrying next tick");
                    false
                }
            };
            self.metrics.record_attach(attached);
            if !attached {
                self.transition(PollState::Detached);
                self.metrics.record_tick(self.state);
                return self.state;
            }
            self.transition(PollState::Attaching);
        }

        let Some(current) = self
            .region
            .attachment()
            .map(|attachment| attachment.snapshot().cycle_counter())
        else {
            self.transition(PollState::Detached);
            self.metrics.record_tick(self.state);
            return self.state;
        };

        if self.state.is_data_available() && self.last_cycle_counter > current {
            // Counter went backwards: the producer restarted and its record
            // offsets may have moved. Withdraw now, re-locate next tick.
            tracing::debug!(
                last = self.last_cycle_counter,
                current = current,
                "Producer restart detected"
            );
            self.metrics.record_restart();
            self.handoff.clear();
            self.last_cycle_counter = current;
            self.transition(PollState::Attaching);
        } else if !self.state.is_data_available() {
            self.last_cycle_counter = current;
            let next = self.relocate();
            self.transition(next);
        }

        self.metrics.record_tick(self.state);
        self.state
    }

    /// Withdraw an attachment whose object the producer has unlinked.
    ///
    /// The mapping is not released here: it is retired and unmapped at the
    /// start of the next tick, one poll interval after the pointer cleared.
    fn check_orphaned(&mut self) {
        if !self.region.is_orphaned() {
            return;
        }

        tracing::debug!(name = %self.config.shm_name, "Producer object unlinked, detaching");
        self.metrics.record_orphaned();
        self.handoff.clear();
        self.retired = self.region.take();
        self.transition(PollState::Detached);
    }

    fn release_retired(&mut self) {
        if let Some(attachment) = self.retired.take() {
            let name = attachment.name().to_string();
            drop(attachment);
            tracing::debug!(name = %name, "Released orphaned producer region");
        }
    }

    fn relocate(&mut self) -> PollState {
        let Some(attachment) = self.region.attachment() else {
            return PollState::Detached;
        };

        match self.locator.locate(attachment) {
            Ok(record) => {
                // SAFETY: the record lies in the attached mapping, which is
                // only released after the pointer has been cleared.
                unsafe { self.handoff.publish(record) };
                self.metrics.record_locate(true);
                PollState::AttachedWithSensor
            }
            Err(LocateError::SensorNotFound { label }) => {
                // Not re-scanned until the next detected restart
                tracing::debug!(label = %label, "Sensor not present in snapshot");
                self.handoff.clear();
                self.metrics.record_locate(false);
                PollState::AttachedNoSensor
            }
            Err(e) => {
                tracing::trace!(error = %e, "Snapshot not ready, retrying next tick");
                self.handoff.clear();
                PollState::Attaching
            }
        }
    }

    /// Tick until `enabled` is cleared, then return the region handle so the
    /// controller can release it after the join.
    pub fn run(mut self, enabled: &AtomicBool) -> RegionHandle {
        tracing::debug!(name = %self.config.shm_name, "Poll loop started");

        while enabled.load(Ordering::Relaxed) {
            self.tick();
            sleep_while_enabled(self.config.poll_interval, enabled);
        }

        self.release_retired();
        self.transition(PollState::Stopped);
        self.metrics.set_state(PollState::Stopped);
        tracing::debug!("Poll loop exited");

        std::mem::take(&mut self.region)
    }
}

/// Sleep for `interval`, waking early once `enabled` is cleared.
fn sleep_while_enabled(interval: Duration, enabled: &AtomicBool) {
    let deadline = Instant::now() + interval;
    loop {
        let now = Instant::now();
        if now >= deadline || !enabled.load(Ordering::Relaxed) {
            return;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::{ProducerRegion, SensorRecord, SensorType, SimulatedSensor};
    use crate::test_support::unique_config;

    fn poll_loop(config: &PollerConfig) -> (PollLoop, Arc<ValueHandoff>, Arc<PollerMetrics>) {
        let handoff = Arc::new(ValueHandoff::new());
        let metrics = Arc::new(PollerMetrics::default());
        let poll = PollLoop::new(config.clone(), handoff.clone(), metrics.clone());
        (poll, handoff, metrics)
    }

    fn publish_sensor(producer: &ProducerRegion, value: f64) {
        let temps = [SimulatedSensor::new("T Sensor", "C", value)];
        producer
            .write_sensors(&[(SensorType::Temperature, &temps[..])])
            .unwrap();
        producer.publish();
    }

    #[test]
    fn test_detached_without_producer() {
        let config = unique_config("poll-absent");
        let (mut poll, handoff, metrics) = poll_loop(&config);

        assert_eq!(poll.tick(), PollState::Detached);
        assert_eq!(poll.tick(), PollState::Detached);
        assert!(!poll.region().is_attached());
        assert_eq!(handoff.read(), None);

        let stats = metrics.snapshot();
        assert_eq!(stats.attach_attempts, 2);
        assert_eq!(stats.attach_failures, 2);
    }

    #[test]
    fn test_attach_and_locate_in_one_tick() {
        let config = unique_config("poll-locate");
        let producer = ProducerRegion::create(&config).unwrap();
        producer.set_cycle_counter(10);
        publish_sensor(&producer, 42.0);

        let (mut poll, handoff, _) = poll_loop(&config);
        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert_eq!(poll.last_cycle_counter(), 10);
        assert_eq!(handoff.read(), Some(42.0));

        // Value updates are visible without another locate
        producer.set_value(0, 43.0).unwrap();
        producer.advance_cycle();
        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert_eq!(handoff.read(), Some(43.0));
    }

    #[test]
    fn test_waits_for_signature() {
        let config = unique_config("poll-signature");
        let producer = ProducerRegion::create(&config).unwrap();

        let (mut poll, handoff, _) = poll_loop(&config);
        assert_eq!(poll.tick(), PollState::Attaching);
        assert_eq!(poll.tick(), PollState::Attaching);
        assert_eq!(handoff.read(), None);

        publish_sensor(&producer, 42.0);
        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert_eq!(handoff.read(), Some(42.0));
    }

    #[test]
    fn test_restart_clears_then_relocates() {
        let config = unique_config("poll-restart");
        let producer = ProducerRegion::create(&config).unwrap();
        producer.set_cycle_counter(100);
        publish_sensor(&producer, 42.0);

        let (mut poll, handoff, metrics) = poll_loop(&config);
        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert_eq!(handoff.read(), Some(42.0));

        // Restart moves the sensor to a different record
        let fans = [SimulatedSensor::new("Fan", "rpm", 800.0)];
        let temps = [SimulatedSensor::new("T Sensor", "C", 17.0)];
        producer
            .restart(&[
                (SensorType::FanSpeedRpm, &fans[..]),
                (SensorType::Temperature, &temps[..]),
            ])
            .unwrap();

        assert_eq!(poll.tick(), PollState::Attaching);
        assert!(!handoff.is_published());
        assert_eq!(handoff.read(), None);
        assert_eq!(metrics.snapshot().restarts_detected, 1);

        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert_eq!(handoff.read(), Some(17.0));
    }

    #[test]
    fn test_restart_with_invalid_signature_keeps_pointer_unset() {
        let config = unique_config("poll-zeroed");
        let producer = ProducerRegion::create(&config).unwrap();
        producer.set_cycle_counter(5);
        publish_sensor(&producer, 42.0);

        let (mut poll, handoff, _) = poll_loop(&config);
        assert_eq!(poll.tick(), PollState::AttachedWithSensor);

        // Graceful producer shutdown zero-fills the region
        producer.zero_fill();
        assert_eq!(poll.tick(), PollState::Attaching);
        assert_eq!(poll.tick(), PollState::Attaching);
        assert!(!handoff.is_published());

        producer.set_cycle_counter(1);
        publish_sensor(&producer, 20.0);
        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert_eq!(handoff.read(), Some(20.0));
    }

    #[test]
    fn test_missing_sensor_not_rescanned_without_restart() {
        let config = unique_config("poll-nosensor");
        let producer = ProducerRegion::create(&config).unwrap();
        producer.set_cycle_counter(3);
        producer.write_sensors(&[]).unwrap();
        producer.publish();

        let (mut poll, handoff, metrics) = poll_loop(&config);
        assert_eq!(poll.tick(), PollState::AttachedNoSensor);

        // Sensor appears without a restart: stays unseen
        publish_sensor(&producer, 42.0);
        producer.advance_cycle();
        assert_eq!(poll.tick(), PollState::AttachedNoSensor);
        assert_eq!(handoff.read(), None);
        assert_eq!(metrics.snapshot().locate_runs, 1);

        // A restart triggers a fresh scan
        producer.set_cycle_counter(0);
        assert_eq!(poll.tick(), PollState::Attaching);
        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert_eq!(handoff.read(), Some(42.0));
    }

    #[test]
    fn test_lock_timeout_retries_next_tick() {
        let mut config = unique_config("poll-lock");
        config.lock_timeout = Duration::from_millis(10);
        let producer = ProducerRegion::create(&config).unwrap();
        publish_sensor(&producer, 42.0);

        let (mut poll, handoff, _) = poll_loop(&config);
        let guard = producer.lock().unwrap();
        assert_eq!(poll.tick(), PollState::Attaching);
        assert_eq!(handoff.read(), None);
        drop(guard);

        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert_eq!(handoff.read(), Some(42.0));
    }

    #[test]
    fn test_reattach_after_producer_recreated() {
        let config = unique_config("poll-recreate");
        let producer = ProducerRegion::create(&config).unwrap();
        producer.set_cycle_counter(50);
        publish_sensor(&producer, 42.0);

        let (mut poll, handoff, metrics) = poll_loop(&config);
        assert_eq!(poll.tick(), PollState::AttachedWithSensor);

        drop(producer);
        let producer = ProducerRegion::create(&config).unwrap();
        producer.set_cycle_counter(60);
        publish_sensor(&producer, 55.0);

        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert_eq!(handoff.read(), Some(55.0));
        assert_eq!(metrics.snapshot().orphaned_detaches, 1);
    }

    #[test]
    fn test_orphaned_mapping_outlives_the_clearing_tick() {
        let config = unique_config("poll-retire");
        let producer = ProducerRegion::create(&config).unwrap();
        producer.set_cycle_counter(50);
        publish_sensor(&producer, 42.0);

        let (mut poll, handoff, _) = poll_loop(&config);
        assert_eq!(poll.tick(), PollState::AttachedWithSensor);

        // A host read that loaded the pointer just before the clear
        let loaded = poll
            .region()
            .attachment()
            .and_then(|attachment| attachment.snapshot().record(0))
            .unwrap();

        drop(producer);
        let producer = ProducerRegion::create(&config).unwrap();
        producer.set_cycle_counter(60);
        publish_sensor(&producer, 55.0);

        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert_eq!(handoff.read(), Some(55.0));
        assert!(poll.retired.is_some());
        // Old mapping is still readable for the rest of this interval
        assert_eq!(unsafe { SensorRecord::read_value(loaded.as_ptr()) }, 42.0);

        assert_eq!(poll.tick(), PollState::AttachedWithSensor);
        assert!(poll.retired.is_none());
        assert_eq!(handoff.read(), Some(55.0));
    }

    #[test]
    fn test_unchanged_counter_is_not_a_restart() {
        let config = unique_config("poll-steady");
        let producer = ProducerRegion::create(&config).unwrap();
        producer.set_cycle_counter(7);
        publish_sensor(&producer, 42.0);

        let (mut poll, handoff, metrics) = poll_loop(&config);
        for _ in 0..5 {
            assert_eq!(poll.tick(), PollState::AttachedWithSensor);
            assert_eq!(poll.last_cycle_counter(), 7);
            assert_eq!(handoff.read(), Some(42.0));
        }

        let stats = metrics.snapshot();
        assert_eq!(stats.restarts_detected, 0);
        assert_eq!(stats.locate_runs, 1);
        assert_eq!(stats.ticks, 5);
    }

    #[test]
    fn test_run_exits_when_disabled() {
        let mut config = unique_config("poll-run");
        config.poll_interval = Duration::from_millis(10);
        let (poll, _, metrics) = poll_loop(&config);
        let enabled = AtomicBool::new(false);

        let region = poll.run(&enabled);
        assert!(!region.is_attached());
        assert_eq!(metrics.snapshot().state, PollState::Stopped);
        assert_eq!(metrics.snapshot().ticks, 0);
    }

    #[test]
    fn test_state_roundtrip_u8() {
        for state in [
            PollState::Detached,
            PollState::Attaching,
            PollState::AttachedNoSensor,
            PollState::AttachedWithSensor,
            PollState::Stopped,
        ] {
            assert_eq!(PollState::from_u8(state as u8), state);
        }
    }
}
