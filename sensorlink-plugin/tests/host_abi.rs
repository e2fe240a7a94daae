// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Tests for the exported host entry points.

use sensorlink_plugin::source::{c_bytes, MONITORING_SOURCE_ID_PLUGIN_MOBO};
use sensorlink_plugin::{
    GetSourceData, GetSourceDesc, GetSourcesNum, MonitoringSourceDesc, SensorLinkAttach,
    SensorLinkDetach, NO_DATA_SENTINEL,
};

#[test]
fn test_single_source() {
    assert_eq!(GetSourcesNum(), 1);
}

#[test]
fn test_source_desc_preserves_version() {
    let mut desc = MonitoringSourceDesc {
        version: 0x0002_0000,
        ..Default::default()
    };

    let ok = unsafe { GetSourceDesc(0, &mut desc) };
    assert_eq!(ok, 1);
    assert_eq!(desc.version, 0x0002_0000);
    assert_eq!(c_bytes(&desc.name), b"T Sensor");
    assert_eq!(c_bytes(&desc.group), b"MOBO");
    assert_eq!(desc.id, MONITORING_SOURCE_ID_PLUGIN_MOBO);
}

#[test]
fn test_source_desc_rejects_bad_input() {
    let mut desc = MonitoringSourceDesc::default();
    assert_eq!(unsafe { GetSourceDesc(1, &mut desc) }, 0);
    assert!(c_bytes(&desc.name).is_empty());
    assert_eq!(unsafe { GetSourceDesc(0, std::ptr::null_mut()) }, 0);
}

/// Lifecycle and value path share global state, so they run as one test
#[test]
fn test_lifecycle_and_value_path() {
    // Before load: no data, and detach without attach is harmless
    assert_eq!(GetSourceData(0), NO_DATA_SENTINEL);
    SensorLinkDetach();

    assert_eq!(SensorLinkAttach(), 1);
    // Second attach is refused rather than spawning a second thread
    assert_eq!(SensorLinkAttach(), 0);

    // Unknown source index never reads the handoff
    assert_eq!(GetSourceData(7), NO_DATA_SENTINEL);

    SensorLinkDetach();
    SensorLinkDetach();
    assert_eq!(GetSourceData(0), NO_DATA_SENTINEL);

    // Reload after unload works
    assert_eq!(SensorLinkAttach(), 1);
    SensorLinkDetach();
}
