//! Integration tests for the native/software merge: unified listings,
//! single-application of shared targets, strict native queries, and
//! cache-backed variants.

mod common;

use std::sync::Arc;

use common::SimNativeEngine;
use unicore::device::demo::DemoStateDevice;
use unicore::{CoreError, PropertyValue, Setting, SoftwareDevice, UniCore};

/// A core with one native filter wheel (engine-owned) and one software LED.
fn mixed_core() -> UniCore {
    common::init_test_logging();
    let engine = SimNativeEngine::new()
        .with_device("Wheel", [("State", "0"), ("Label", "Open")])
        .with_config("Channel", "DAPI", [("Wheel", "Label", "Closed")])
        .with_config("Channel", "FITC", [("Wheel", "Label", "Open")]);
    let mut core = UniCore::with_engine(Arc::new(engine));
    core.load_device(
        "PyLED",
        SoftwareDevice::State(Box::new(DemoStateDevice::with_intensity(
            "PyLED",
            [(0, "UV"), (1, "BLUE")],
        ))),
    )
    .unwrap();
    core.initialize_all_devices().unwrap();
    core
}

#[test]
fn loaded_devices_interleave_both_populations() {
    let core = mixed_core();
    let devices = core.get_loaded_devices().unwrap();
    assert!(devices.contains(&"PyLED".to_string()));
    assert!(devices.contains(&"Wheel".to_string()));
}

#[test]
fn native_properties_route_through_the_engine() {
    let mut core = mixed_core();
    assert_eq!(
        core.get_property("Wheel", "Label").unwrap(),
        PropertyValue::Str("Open".to_string())
    );
    core.set_property("Wheel", "Label", PropertyValue::Str("Closed".to_string()))
        .unwrap();
    assert_eq!(
        core.get_property("Wheel", "Label").unwrap(),
        PropertyValue::Str("Closed".to_string())
    );
}

#[test]
fn group_listings_are_the_union_software_first() {
    let mut core = mixed_core();
    core.define_config(
        "Power",
        "Full",
        Some(Setting::new("PyLED", "Intensity", "100")),
    );
    assert_eq!(
        core.get_available_config_groups().unwrap(),
        vec!["Power", "Channel"]
    );

    // Extend the native group with a software config of a new name: the
    // union lists software definitions first.
    core.define_config(
        "Channel",
        "CY5",
        Some(Setting::new("PyLED", "Label", "UV")),
    );
    assert_eq!(
        core.get_available_configs("Channel").unwrap(),
        vec!["CY5", "DAPI", "FITC"]
    );
}

#[test]
fn set_config_applies_native_once_and_software_remainder() {
    let mut core = mixed_core();
    // Same config name on both sides; the software side adds an LED move
    // and repeats the wheel target, which must not be applied twice.
    core.define_config(
        "Channel",
        "DAPI",
        Some(Setting::new("Wheel", "Label", "Closed")),
    );
    core.define_config(
        "Channel",
        "DAPI",
        Some(Setting::new("PyLED", "Label", "BLUE")),
    );

    core.set_config("Channel", "DAPI").unwrap();
    assert_eq!(
        core.get_property("Wheel", "Label").unwrap(),
        PropertyValue::Str("Closed".to_string())
    );
    assert_eq!(core.get_state_label("PyLED").unwrap(), "BLUE");
}

#[test]
fn purely_native_config_applies_through_the_engine() {
    let mut core = mixed_core();
    core.set_config("Channel", "DAPI").unwrap();
    assert_eq!(
        core.get_property("Wheel", "Label").unwrap(),
        PropertyValue::Str("Closed".to_string())
    );
}

#[test]
fn strictly_native_state_ignores_software_groups() {
    let mut core = mixed_core();
    core.define_config(
        "Power",
        "Full",
        Some(Setting::new("PyLED", "Intensity", "100")),
    );

    let state = core.get_config_group_state_native("Channel").unwrap();
    assert_eq!(state["Wheel"]["Label"], "Open");

    let err = core.get_config_group_state_native("Power").unwrap_err();
    assert!(matches!(err, CoreError::NativeOnly { .. }));
    assert!(err.to_string().contains("Power"));
}

#[test]
fn merged_group_state_covers_both_sides() {
    let mut core = mixed_core();
    core.define_config(
        "Channel",
        "CY5",
        Some(Setting::new("PyLED", "Label", "UV")),
    );
    let state = core.get_config_group_state("Channel").unwrap();
    assert_eq!(state["Wheel"]["Label"], "Open");
    assert_eq!(state["PyLED"]["Label"], "UV");
}

#[test]
fn current_config_prefers_software_definition_order() {
    let mut core = mixed_core();
    // Software config matching the same live state as the native "FITC".
    core.define_config(
        "Channel",
        "OpenByAnotherName",
        Some(Setting::new("Wheel", "Label", "Open")),
    );
    assert_eq!(
        core.get_current_config("Channel").unwrap(),
        Some("OpenByAnotherName".to_string())
    );
}

#[test]
fn current_config_falls_through_to_native_definitions() {
    let mut core = mixed_core();
    core.set_config("Channel", "DAPI").unwrap();
    assert_eq!(
        core.get_current_config("Channel").unwrap(),
        Some("DAPI".to_string())
    );
}

#[test]
fn cached_queries_answer_without_live_reads() {
    let engine = Arc::new(
        SimNativeEngine::new()
            .with_device("Wheel", [("State", "0"), ("Label", "Open")])
            .with_config("Channel", "DAPI", [("Wheel", "Label", "Closed")])
            .with_config("Channel", "FITC", [("Wheel", "Label", "Open")]),
    );
    let core = UniCore::with_engine(Arc::clone(&engine) as Arc<dyn unicore::NativeEngine>);

    // Hardware drifts behind the engine's cache.
    engine.drift_property("Wheel", "Label", "Closed");

    assert_eq!(
        core.get_property("Wheel", "Label").unwrap(),
        PropertyValue::Str("Closed".to_string())
    );
    assert_eq!(
        core.get_property_from_cache("Wheel", "Label").unwrap(),
        PropertyValue::Str("Open".to_string())
    );
    assert_eq!(
        core.get_current_config("Channel").unwrap(),
        Some("DAPI".to_string())
    );
    assert_eq!(
        core.get_current_config_from_cache("Channel").unwrap(),
        Some("FITC".to_string())
    );
    let state = core.get_config_group_state_from_cache("Channel").unwrap();
    assert_eq!(state["Wheel"]["Label"], "Open");
}

#[test]
fn system_state_cache_snapshots_the_engine_cache() {
    let engine = Arc::new(
        SimNativeEngine::new().with_device("Wheel", [("State", "0"), ("Label", "Open")]),
    );
    let mut core = UniCore::with_engine(Arc::clone(&engine) as Arc<dyn unicore::NativeEngine>);

    engine.drift_property("Wheel", "Label", "Closed");
    core.update_system_state_cache().unwrap();

    // Native entries come from the engine's cache, not a live read.
    let cached = core.get_system_state_cache();
    let label = cached
        .iter()
        .find(|s| s.device == "Wheel" && s.property == "Label")
        .unwrap();
    assert_eq!(label.value, "Open");
    let live = core.get_system_state().unwrap();
    let label = live
        .iter()
        .find(|s| s.device == "Wheel" && s.property == "Label")
        .unwrap();
    assert_eq!(label.value, "Closed");
}

#[test]
fn native_config_data_is_visible_through_the_facade() {
    let core = mixed_core();
    let data = core.get_config_data("Channel", "DAPI").unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].device, "Wheel");
    assert_eq!(data[0].value, "Closed");
    assert!(core.is_config_defined("Channel", "DAPI").unwrap());
    assert!(!core.is_config_defined("Channel", "Ghost").unwrap());
}

#[test]
fn unknown_group_is_unknown_on_both_sides() {
    let core = mixed_core();
    assert!(matches!(
        core.get_config_group_state("Ghost").unwrap_err(),
        CoreError::GroupNotFound { .. }
    ));
    assert!(!core.is_group_defined("Ghost").unwrap());
}

#[test]
fn wait_for_config_spans_both_populations() {
    let mut core = mixed_core();
    core.define_config(
        "Channel",
        "DAPI",
        Some(Setting::new("PyLED", "Label", "UV")),
    );
    core.set_config("Channel", "DAPI").unwrap();
    core.wait_for_config("Channel", "DAPI").unwrap();
}
