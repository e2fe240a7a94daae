// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared memory access to the producer's sensor snapshot.
//!
//! Read-only POSIX shared memory plus the producer's named mutex, the
//! snapshot layout, and a simulated producer for tests.

pub mod layout;
mod mutex;
mod producer;
mod region;

pub use layout::{SensorRecord, SensorType, SnapshotView};
pub use mutex::{NamedMutex, NamedMutexGuard};
pub use producer::{ProducerRegion, SimulatedSensor, PRODUCER_VERSION};
pub use region::{Attachment, MappedView, RegionHandle, ShmObject};
