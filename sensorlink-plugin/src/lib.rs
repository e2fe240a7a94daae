// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SensorLink monitoring host plugin.
//!
//! Exposes one data source, the producer's "T Sensor" reading, through the
//! host's C entry points, and starts/stops the poll thread from the process
//! attach/detach hooks. The value path never takes a lock.

#![allow(non_snake_case)]

pub mod source;

use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use sensorlink_core::{Poller, PollerConfig, StartError, ValueHandoff};

pub use source::MonitoringSourceDesc;

/// Value reported to the host when no sensor is located.
pub const NO_DATA_SENTINEL: f32 = 0.0;

/// Environment variable enabling diagnostic logging (an `EnvFilter` directive).
pub const LOG_ENV: &str = "SENSORLINK_LOG";

/// Published sensor pointer, read lock-free by `GetSourceData`.
static HANDOFF: LazyLock<Arc<ValueHandoff>> = LazyLock::new(|| Arc::new(ValueHandoff::new()));

/// Poll thread controller, touched only by the attach/detach hooks.
static POLLER: Mutex<Option<Poller>> = Mutex::new(None);

/// Install a stderr subscriber if `SENSORLINK_LOG` is set.
///
/// Leaves any subscriber the host already installed in place.
fn init_logging() {
    let Ok(filter) = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Start polling the producer.
pub fn attach() -> Result<(), StartError> {
    init_logging();

    let mut poller = POLLER.lock().unwrap_or_else(PoisonError::into_inner);
    if poller.is_some() {
        return Err(StartError::AlreadyRunning);
    }

    *poller = Some(Poller::start(PollerConfig::default(), HANDOFF.clone())?);
    Ok(())
}

/// Stop polling and release the producer region. A no-op if not attached.
pub fn detach() {
    let poller = POLLER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(mut poller) = poller {
        poller.stop();
    }
}

/// Current value for the host, or [`NO_DATA_SENTINEL`].
pub fn current_value() -> f32 {
    HANDOFF
        .read()
        .map(|value| value as f32)
        .unwrap_or(NO_DATA_SENTINEL)
}

// -------------------------------------------------------------------------
// Host plugin entry points
// -------------------------------------------------------------------------

/// Number of data sources this plugin exposes.
#[no_mangle]
pub extern "C" fn GetSourcesNum() -> u32 {
    1
}

/// Fill in the descriptor for source `index`.
///
/// Returns 1 on success, 0 for an unknown index or a null descriptor.
///
/// # Safety
/// `desc` must be null or point to a writable `MonitoringSourceDesc`.
#[no_mangle]
pub unsafe extern "C" fn GetSourceDesc(index: u32, desc: *mut MonitoringSourceDesc) -> i32 {
    if index != 0 || desc.is_null() {
        return 0;
    }

    let version = (*desc).version;
    desc.write(MonitoringSourceDesc::describe(version));
    1
}

/// Latest reading for source `index`.
#[no_mangle]
pub extern "C" fn GetSourceData(index: u32) -> f32 {
    if index != 0 {
        return NO_DATA_SENTINEL;
    }
    current_value()
}

// -------------------------------------------------------------------------
// Process lifecycle hooks
// -------------------------------------------------------------------------

/// Process attach: start the poll thread. Returns 0 to abort the load.
#[no_mangle]
pub extern "C" fn SensorLinkAttach() -> i32 {
    match attach() {
        Ok(()) => 1,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start sensor poller");
            0
        }
    }
}

/// Process detach: stop the poll thread and release all resources.
#[no_mangle]
pub extern "C" fn SensorLinkDetach() {
    detach();
}
