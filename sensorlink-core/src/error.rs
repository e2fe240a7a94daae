//! Custom error types for SensorLink.
//!
//! Explicit enum error types only. No `Box<dyn Error>`, no `anyhow::Result`.
//! Attach and locate failures are expected in steady state and are absorbed
//! by the poll loop; only [`StartError`] ever reaches the host.

use thiserror::Error;

/// Top-level error type for the sensor bridge.
#[derive(Debug, Error)]
pub enum SensorLinkError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // =========================================================================
    // Shared Memory Errors - Recoverable by Retry
    // =========================================================================
    #[error("Attach error: {0}")]
    Attach(#[from] AttachError),

    #[error("Locate error: {0}")]
    Locate(#[from] LocateError),

    // =========================================================================
    // Lifecycle Errors - Fatal to the Component
    // =========================================================================
    #[error("Start error: {0}")]
    Start(#[from] StartError),

    // =========================================================================
    // Simulated Producer Errors
    // =========================================================================
    #[error("Producer error: {0}")]
    Producer(#[from] ProducerError),
}

/// Hard validation errors for [`crate::PollerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}")]
    EmptyName { field: &'static str },

    #[error("Invalid object name for {field}: {name} - {reason}")]
    InvalidName {
        field: &'static str,
        name: String,
        reason: &'static str,
    },

    #[error("Region size {size} is below the snapshot layout size {required}")]
    RegionTooSmall { size: usize, required: usize },

    #[error("Invalid sensor label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    #[error("Poll interval must be non-zero")]
    ZeroInterval,
}

/// Failures while attaching to the producer's region and mutex.
///
/// Every variant means "producer not (fully) there yet" and is retried.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("Shared memory object not found: {name} - {reason}")]
    ProducerAbsent { name: String, reason: String },

    #[error("Shared memory object {name} is {size} bytes, need at least {required}")]
    RegionTooSmall {
        name: String,
        size: usize,
        required: usize,
    },

    #[error("Failed to map shared memory: {reason}")]
    MapFailed { reason: String },

    #[error("Named mutex not found: {name} - {reason}")]
    MutexAbsent { name: String, reason: String },

    #[error("Invalid object name: {name}")]
    InvalidName { name: String },
}

/// Failures while validating the snapshot or scanning the sensor table.
///
/// None of these are hard errors; they all mean "no data yet".
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("Snapshot signature mismatch: expected {expected:#010x}, got {found:#010x}")]
    SignatureInvalid { expected: u32, found: u32 },

    #[error("No sensor labelled '{label}' in the table")]
    SensorNotFound { label: String },

    #[error("Sensor table out of bounds: offset {offset} + count {count} > capacity {capacity}")]
    TableOutOfBounds {
        offset: u32,
        count: u32,
        capacity: usize,
    },

    #[error("Timed out after {timeout_ms}ms waiting for the producer mutex")]
    LockTimeout { timeout_ms: u64 },

    #[error("Waiting for the producer mutex failed: {reason}")]
    LockFailed { reason: String },
}

/// Lifecycle start-up failures. Surfaced to the host as a failed load.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("Invalid poller configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Failed to spawn poll thread: {reason}")]
    SpawnFailed { reason: String },

    #[error("Poller is already running")]
    AlreadyRunning,
}

/// Errors raised by the simulated producer used for testing and demos.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("Failed to create producer object: {name} - {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Failed to map producer region: {reason}")]
    MapFailed { reason: String },

    #[error("Record index {index} exceeds capacity {capacity}")]
    RecordOutOfRange { index: usize, capacity: usize },

    #[error("Label '{label}' does not fit in {max} UTF-16 units")]
    LabelTooLong { label: String, max: usize },

    #[error("Producer lock failed: {0}")]
    Lock(#[from] LocateError),
}

/// Result type alias using SensorLinkError.
pub type SensorLinkResult<T> = Result<T, SensorLinkError>;
