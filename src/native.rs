//! Interface to the native hardware-abstraction engine.
//!
//! The native engine is an external service: it owns its own device
//! adapters, its own config-group storage, and its own error types. The core
//! consumes it through [`NativeEngine`] and treats every call as a fallible
//! remote call returning an opaque `anyhow::Error`; the directory and merge
//! engine wrap those errors into [`CoreError::Native`] at the boundary
//! (`CoreError::native`), so callers of the core never see engine-specific
//! error types.
//!
//! [`NullNativeEngine`] is the implementation used when no native engine is
//! attached: it reports no devices and no groups, and fails any addressed
//! call by naming the entity it cannot resolve.
//!
//! [`CoreError::Native`]: crate::error::CoreError::Native
//! [`CoreError::native`]: crate::error::CoreError::native

use anyhow::{bail, Result};

/// One (device, property, value) triplet as the native engine stores it.
///
/// Values are wire strings; coercion to typed values is the core's job and
/// happens at its property-set boundary.
pub type NativeSetting = (String, String, String);

/// Opaque service interface to the native engine.
///
/// All methods are fallible remote calls. Implementations typically proxy a
/// C-level control core; tests substitute an in-memory simulation.
pub trait NativeEngine: Send + Sync {
    /// Labels of every device the engine has loaded.
    fn loaded_devices(&self) -> Result<Vec<String>>;

    /// Property names of a native device.
    fn device_property_names(&self, device: &str) -> Result<Vec<String>>;

    /// Names of every config group the engine stores natively.
    fn list_groups(&self) -> Result<Vec<String>>;

    /// Config names inside a native group.
    fn list_configs(&self, group: &str) -> Result<Vec<String>>;

    /// The (device, property, value) triplets of a native config.
    fn config_data(&self, group: &str, config: &str) -> Result<Vec<NativeSetting>>;

    /// Apply a native config through the engine's own path.
    fn apply_config(&self, group: &str, config: &str) -> Result<()>;

    /// Live read of a native device property.
    fn get_property(&self, device: &str, property: &str) -> Result<String>;

    /// Write a native device property (wire-string value).
    fn set_property(&self, device: &str, property: &str, value: &str) -> Result<()>;

    /// Read a property from the engine's own state cache instead of the
    /// hardware.
    fn get_cached_property(&self, device: &str, property: &str) -> Result<String>;

    /// Live state of every (device, property) pair a native group touches.
    fn group_state(&self, group: &str) -> Result<Vec<NativeSetting>>;

    /// Whether a native device is still processing a command.
    fn is_busy(&self, device: &str) -> Result<bool>;
}

/// The engine used when no native hardware stack is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNativeEngine;

impl NativeEngine for NullNativeEngine {
    fn loaded_devices(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn device_property_names(&self, device: &str) -> Result<Vec<String>> {
        bail!("no native engine attached (device '{device}')")
    }

    fn list_groups(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn list_configs(&self, group: &str) -> Result<Vec<String>> {
        bail!("no native engine attached (group '{group}')")
    }

    fn config_data(&self, group: &str, config: &str) -> Result<Vec<NativeSetting>> {
        bail!("no native engine attached (config '{group}/{config}')")
    }

    fn apply_config(&self, group: &str, config: &str) -> Result<()> {
        bail!("no native engine attached (config '{group}/{config}')")
    }

    fn get_property(&self, device: &str, property: &str) -> Result<String> {
        bail!("no native engine attached (property '{device}/{property}')")
    }

    fn set_property(&self, device: &str, property: &str, _value: &str) -> Result<()> {
        bail!("no native engine attached (property '{device}/{property}')")
    }

    fn get_cached_property(&self, device: &str, property: &str) -> Result<String> {
        bail!("no native engine attached (property '{device}/{property}')")
    }

    fn group_state(&self, group: &str) -> Result<Vec<NativeSetting>> {
        bail!("no native engine attached (group '{group}')")
    }

    fn is_busy(&self, device: &str) -> Result<bool> {
        bail!("no native engine attached (device '{device}')")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_engine_has_no_devices_or_groups() {
        let engine = NullNativeEngine;
        assert!(engine.loaded_devices().unwrap().is_empty());
        assert!(engine.list_groups().unwrap().is_empty());
    }

    #[test]
    fn null_engine_names_unresolvable_entities() {
        let engine = NullNativeEngine;
        let err = engine.get_property("Camera", "Binning").unwrap_err();
        assert!(err.to_string().contains("Camera/Binning"));
    }
}
