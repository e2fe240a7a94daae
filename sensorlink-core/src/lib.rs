//! SensorLink Core Library
//!
//! Background polling engine for the SensorLink bridge. Attaches to a
//! producer's shared-memory sensor snapshot, locates one sensor record and
//! hands its latest value to a host thread without locking.

pub mod config;
pub mod error;
pub mod handoff;
pub mod lifecycle;
pub mod locator;
pub mod poller;
pub mod shm;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::PollerConfig;
pub use error::{
    AttachError, ConfigError, LocateError, ProducerError, SensorLinkError, SensorLinkResult,
    StartError,
};
pub use handoff::{ValueHandoff, NO_DATA};
pub use lifecycle::Poller;
pub use locator::SensorLocator;
pub use poller::{PollLoop, PollState};
pub use shm::{ProducerRegion, RegionHandle, SensorType, SimulatedSensor};
pub use stats::{PollerMetrics, PollerStats};
