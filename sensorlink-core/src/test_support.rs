//! Helpers shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::PollerConfig;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// A shared object name unique to this process and call.
pub(crate) fn unique_name(tag: &str) -> String {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("sensorlink-test-{}-{}-{}", std::process::id(), tag, id)
}

/// Default config with unique object names.
pub(crate) fn unique_config(tag: &str) -> PollerConfig {
    PollerConfig {
        shm_name: unique_name(tag),
        mutex_name: unique_name(&format!("{}-mutex", tag)),
        ..Default::default()
    }
}
