// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Monitoring source descriptor shared with the host.
//!
//! Strings are fixed-size, NUL-terminated byte buffers in the host's
//! single-byte codepage (Windows-1252), not UTF-8.

/// Length of every string buffer in the descriptor.
pub const MAX_PATH: usize = 260;

/// Host source id for motherboard plugin sources.
pub const MONITORING_SOURCE_ID_PLUGIN_MOBO: u32 = 0xE2;

/// Display name, also the producer label we look for.
pub const SOURCE_NAME: &str = "T Sensor";

/// Degree sign followed by C, in Windows-1252.
pub const SOURCE_UNITS: &[u8] = b"\xB0C";

pub const SOURCE_FORMAT: &str = "%.0f";
pub const SOURCE_GROUP: &str = "MOBO";
pub const SOURCE_MIN_LIMIT: f32 = 0.0;
pub const SOURCE_MAX_LIMIT: f32 = 100.0;

/// Descriptor filled in by `GetSourceDesc`.
#[repr(C)]
#[derive(Clone)]
pub struct MonitoringSourceDesc {
    /// Set by the host; preserved across a fill.
    pub version: u32,
    pub name: [u8; MAX_PATH],
    pub units: [u8; MAX_PATH],
    pub format: [u8; MAX_PATH],
    pub group: [u8; MAX_PATH],
    pub id: u32,
    pub instance: u32,
    pub max_limit: f32,
    pub min_limit: f32,
    pub name_template: [u8; MAX_PATH],
    pub group_template: [u8; MAX_PATH],
}

impl Default for MonitoringSourceDesc {
    fn default() -> Self {
        Self {
            version: 0,
            name: [0; MAX_PATH],
            units: [0; MAX_PATH],
            format: [0; MAX_PATH],
            group: [0; MAX_PATH],
            id: 0,
            instance: 0,
            max_limit: 0.0,
            min_limit: 0.0,
            name_template: [0; MAX_PATH],
            group_template: [0; MAX_PATH],
        }
    }
}

fn fixed(bytes: &[u8]) -> [u8; MAX_PATH] {
    let mut buf = [0u8; MAX_PATH];
    let len = bytes.len().min(MAX_PATH - 1);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

/// Read a NUL-terminated buffer back as bytes.
pub fn c_bytes(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

impl MonitoringSourceDesc {
    /// Describe the single exposed source, keeping the host's version field.
    pub fn describe(version: u32) -> Self {
        Self {
            version,
            name: fixed(SOURCE_NAME.as_bytes()),
            units: fixed(SOURCE_UNITS),
            format: fixed(SOURCE_FORMAT.as_bytes()),
            group: fixed(SOURCE_GROUP.as_bytes()),
            id: MONITORING_SOURCE_ID_PLUGIN_MOBO,
            instance: 0,
            max_limit: SOURCE_MAX_LIMIT,
            min_limit: SOURCE_MIN_LIMIT,
            name_template: [0; MAX_PATH],
            group_template: [0; MAX_PATH],
        }
    }
}
