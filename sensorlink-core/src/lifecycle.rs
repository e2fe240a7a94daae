// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Start/stop control for the background poll thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::PollerConfig;
use crate::error::StartError;
use crate::handoff::ValueHandoff;
use crate::poller::PollLoop;
use crate::shm::RegionHandle;
use crate::stats::{PollerMetrics, PollerStats};

/// Name given to the poll thread.
pub const POLL_THREAD_NAME: &str = "sensorlink-poll";

/// Owner of the poll thread.
///
/// The thread owns the region handle while it runs and hands it back on
/// join; [`Poller::stop`] releases it after the thread has exited.
pub struct Poller {
    enabled: Arc<AtomicBool>,
    handoff: Arc<ValueHandoff>,
    metrics: Arc<PollerMetrics>,
    thread: Option<JoinHandle<RegionHandle>>,
}

impl Poller {
    /// Validate the config and spawn the poll thread.
    ///
    /// # Errors
    /// [`StartError`] if the config is invalid or the thread cannot be
    /// created; nothing is left running in either case.
    pub fn start(config: PollerConfig, handoff: Arc<ValueHandoff>) -> Result<Self, StartError> {
        config.validate()?;

        let enabled = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(PollerMetrics::default());
        let poll = PollLoop::new(config, handoff.clone(), metrics.clone());

        let thread_enabled = enabled.clone();
        let spawned = std::thread::Builder::new()
            .name(POLL_THREAD_NAME.to_string())
            .spawn(move || poll.run(&thread_enabled));

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                enabled.store(false, Ordering::Relaxed);
                handoff.clear();
                return Err(StartError::SpawnFailed {
                    reason: e.to_string(),
                });
            }
        };

        tracing::info!("Sensor poller started");

        Ok(Self {
            enabled,
            handoff,
            metrics,
            thread: Some(thread),
        })
    }

    /// Whether the poll thread is still owned by this controller.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Latest sensor reading, or `None` for "no data".
    pub fn current_value(&self) -> Option<f64> {
        self.handoff.read()
    }

    /// Snapshot of the poll thread's counters.
    pub fn stats(&self) -> PollerStats {
        self.metrics.snapshot()
    }

    /// Stop the poll thread and release the producer region.
    ///
    /// Blocks until the thread has exited. Idempotent.
    pub fn stop(&mut self) {
        self.enabled.store(false, Ordering::Relaxed);

        let Some(thread) = self.thread.take() else {
            return;
        };

        let region = match thread.join() {
            Ok(region) => Some(region),
            Err(_) => {
                tracing::error!("Poll thread panicked");
                None
            }
        };

        // Withdraw the pointer before its mapping goes away
        self.handoff.clear();
        if let Some(mut region) = region {
            region.detach();
        }

        tracing::info!("Sensor poller stopped");
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
