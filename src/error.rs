//! Custom error types for the device-control core.
//!
//! This module defines the primary error type, `CoreError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure modes of the property/state/config
//! model, from unknown device labels to config-application problems.
//!
//! ## Error Hierarchy
//!
//! `CoreError` is an enum that consolidates the core's failure taxonomy:
//!
//! - **Property errors**: `PropertyNotFound`, `PropertyNotSettable`,
//!   `TypeCoercion`, `ValueNotAllowed`, `LimitViolation`, `NotSequenceable` —
//!   raised at the property-registry boundary where wire-string values are
//!   coerced and validated exactly once.
//! - **Device errors**: `DeviceNotFound`, `DuplicateDevice`,
//!   `WrongDeviceKind`, `ContractViolation` — raised by the unified device
//!   directory when a label cannot be routed or a device fails its
//!   initialization-time contract check.
//! - **State errors**: `InvalidState`, `UndefinedLabel` — a discrete-state
//!   device never clamps or ignores an out-of-domain position; both sides of
//!   the index/label pair fail loudly.
//! - **Camera errors**: `InvalidRoi` — bounds violations leave the stored ROI
//!   unchanged.
//! - **Config errors**: `GroupNotFound`, `ConfigNotFound`, `NativeOnly` —
//!   `NativeOnly` is raised when a strictly-native query targets a group the
//!   native engine does not know, even if a software group of the same name
//!   exists.
//! - **`Native`**: wraps an opaque error raised by the native
//!   hardware-abstraction engine, so callers never need to understand the
//!   engine's own error types.
//!
//! Every variant names the offending entity (device label, property name,
//! group/config name, or the rejected value) so failures are diagnosable
//! without a debugger. None of these errors are swallowed or retried
//! internally; they surface to the immediate caller of the operation that
//! detected them.

use thiserror::Error;

/// Convenience alias for results using the core error type.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// The error taxonomy for the device-control core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The device has no property registered under the given name.
    #[error("Device '{device}' has no property named '{property}'")]
    PropertyNotFound {
        /// Device label.
        device: String,
        /// Property name.
        property: String,
    },

    /// The property exists but was registered without a setter.
    #[error("Property '{property}' on device '{device}' is read-only")]
    PropertyNotSettable {
        /// Device label.
        device: String,
        /// Property name.
        property: String,
    },

    /// A wire-string value could not be coerced to the declared type.
    #[error("Cannot coerce value '{value}' to {target}")]
    TypeCoercion {
        /// The raw value that failed coercion.
        value: String,
        /// The declared target type.
        target: String,
    },

    /// The value is outside the property's allowed-value set.
    #[error("Value '{value}' is not among the allowed values for property '{property}'")]
    ValueNotAllowed {
        /// Property name.
        property: String,
        /// The rejected value.
        value: String,
    },

    /// The numeric value is outside the property's declared limits.
    #[error("Value {value} for property '{property}' is outside limits [{min}, {max}]")]
    LimitViolation {
        /// Property name.
        property: String,
        /// The rejected value.
        value: f64,
        /// Lower limit (inclusive).
        min: f64,
        /// Upper limit (inclusive).
        max: f64,
    },

    /// The property was registered without sequence hooks.
    #[error("Property '{property}' on device '{device}' does not support value sequences")]
    NotSequenceable {
        /// Device label.
        device: String,
        /// Property name.
        property: String,
    },

    /// No device is loaded under the given label.
    #[error("No device loaded under label '{device}'")]
    DeviceNotFound {
        /// The unknown label.
        device: String,
    },

    /// A device is already loaded under the given label.
    #[error("A device is already loaded under label '{device}'")]
    DuplicateDevice {
        /// The colliding label.
        device: String,
    },

    /// A kind-specific operation was routed to a device of another kind.
    #[error("Device '{device}' is not a {expected} device")]
    WrongDeviceKind {
        /// Device label.
        device: String,
        /// The kind the operation requires.
        expected: String,
    },

    /// The device failed its initialization-time contract validation.
    #[error("Device '{device}' violates its contract: {message}")]
    ContractViolation {
        /// Device label.
        device: String,
        /// What the device failed to provide.
        message: String,
    },

    /// A state index outside the device's position domain.
    #[error("Position {index} is not a valid state for device '{device}'")]
    InvalidState {
        /// Device label.
        device: String,
        /// The out-of-domain index.
        index: i64,
    },

    /// A state label with no entry in the device's index/label mapping.
    #[error("Label not defined: '{label}' (device '{device}')")]
    UndefinedLabel {
        /// Device label.
        device: String,
        /// The unknown state label.
        label: String,
    },

    /// An ROI that violates the sensor-bounds invariant.
    #[error(
        "Invalid ROI ({x}, {y}, {width}, {height}) for sensor {sensor_width}x{sensor_height}: \
         coordinates must be non-negative, dimensions positive, and the region within bounds"
    )]
    InvalidRoi {
        /// Requested origin x.
        x: i64,
        /// Requested origin y.
        y: i64,
        /// Requested width.
        width: i64,
        /// Requested height.
        height: i64,
        /// Sensor width in pixels.
        sensor_width: usize,
        /// Sensor height in pixels.
        sensor_height: usize,
    },

    /// No config group known under the given name (neither software nor native).
    #[error("No config group named '{group}'")]
    GroupNotFound {
        /// Group name.
        group: String,
    },

    /// The group exists but holds no config under the given name.
    #[error("No config named '{config}' in group '{group}'")]
    ConfigNotFound {
        /// Group name.
        group: String,
        /// Config name.
        config: String,
    },

    /// A strictly-native query targeted a group the native engine does not know.
    #[error("Config group '{group}' has no native-side representation")]
    NativeOnly {
        /// Group name.
        group: String,
    },

    /// An opaque failure from the native hardware-abstraction engine.
    #[error("Native engine failed during {context}: {source}")]
    Native {
        /// The core operation that crossed the boundary.
        context: String,
        /// The engine's own error, unaltered.
        #[source]
        source: anyhow::Error,
    },
}

impl CoreError {
    /// Wrap an opaque native-engine error, recording which core operation
    /// crossed the boundary.
    pub fn native(context: impl Into<String>, source: anyhow::Error) -> Self {
        CoreError::Native {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_entity() {
        let err = CoreError::PropertyNotSettable {
            device: "PyLED".into(),
            property: "Gain".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("PyLED"));
        assert!(msg.contains("Gain"));

        let err = CoreError::InvalidState {
            device: "Wheel".into(),
            index: 999,
        };
        assert!(err.to_string().contains("999"));

        let err = CoreError::UndefinedLabel {
            device: "Wheel".into(),
            label: "INVALID".into(),
        };
        assert!(err.to_string().contains("'INVALID'"));
    }

    #[test]
    fn native_wrapper_preserves_source_message() {
        let err = CoreError::native("set_property", anyhow::anyhow!("bus timeout"));
        let msg = err.to_string();
        assert!(msg.contains("set_property"));
        assert!(msg.contains("bus timeout"));
    }

    #[test]
    fn roi_message_reports_sensor_bounds() {
        let err = CoreError::InvalidRoi {
            x: 100,
            y: 0,
            width: 64,
            height: 64,
            sensor_width: 128,
            sensor_height: 128,
        };
        assert!(err.to_string().contains("128x128"));
    }
}
