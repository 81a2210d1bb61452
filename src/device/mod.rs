//! Device contracts.
//!
//! The base [`Device`] trait is the capability set every software-defined
//! device must satisfy: a property surface, a busy/ready query, and the
//! initialize/shutdown lifecycle. Specializations live in submodules:
//!
//! - [`state`]: devices whose identity is a finite enumerated state with a
//!   bidirectional index ↔ label mapping (filter wheels, turrets, LED banks).
//! - [`camera`]: sensor geometry, exposure, ROI, and the lazy acquisition
//!   protocol.
//! - [`demo`]: simulated devices used by the test suites and available for
//!   downstream dry runs.
//!
//! A device implementer only satisfies this surface; devices never call back
//! into the directory or the config store.

pub mod camera;
pub mod demo;
pub mod state;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::property::{PropertyInfo, PropertyValue};

/// Device classification, used for routing kind-specific operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// A device with only a generic property surface.
    Generic,
    /// A discrete-state device (index ↔ label positions).
    State,
    /// A camera.
    Camera,
}

impl DeviceKind {
    /// Human-readable label for error messages and logs.
    pub fn label(&self) -> &'static str {
        match self {
            DeviceKind::Generic => "generic",
            DeviceKind::State => "state",
            DeviceKind::Camera => "camera",
        }
    }
}

/// Base contract for software-defined devices.
///
/// Property access delegates to the device's [`PropertyRegistry`]
/// (registered once at construction); the lifecycle hooks default to no-ops
/// for devices with nothing to bring up or tear down.
///
/// [`PropertyRegistry`]: crate::property::PropertyRegistry
pub trait Device: Send {
    /// Human-readable model name (not the directory label).
    fn name(&self) -> &str;

    /// Device classification.
    fn kind(&self) -> DeviceKind {
        DeviceKind::Generic
    }

    /// Bring the device up. Called once by the directory when the device
    /// transitions from loaded to initialized.
    fn initialize(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// Tear the device down.
    fn shutdown(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// Whether the device is still processing a previous command.
    fn busy(&self) -> bool {
        false
    }

    /// Property names in registration order.
    fn property_names(&self) -> Vec<String>;

    /// Introspection record for one property.
    fn property_info(&self, name: &str) -> CoreResult<PropertyInfo>;

    /// Read a property value.
    fn get_property(&self, name: &str) -> CoreResult<PropertyValue>;

    /// Write a property value (coercion and validation happen in the
    /// registry, once).
    fn set_property(&mut self, name: &str, value: PropertyValue) -> CoreResult<()>;

    /// Whether a property supports hardware value sequences.
    fn is_property_sequenceable(&self, name: &str) -> CoreResult<bool> {
        // Default for devices that registered no hooks anywhere.
        self.property_info(name).map(|info| info.sequenceable)
    }

    /// Load a value sequence for a sequenceable property.
    fn load_property_sequence(&mut self, name: &str, _values: &[PropertyValue]) -> CoreResult<()> {
        Err(CoreError::NotSequenceable {
            device: self.name().to_string(),
            property: name.to_string(),
        })
    }

    /// Start the loaded value sequence.
    fn start_property_sequence(&mut self, name: &str) -> CoreResult<()> {
        Err(CoreError::NotSequenceable {
            device: self.name().to_string(),
            property: name.to_string(),
        })
    }

    /// Stop the running value sequence.
    fn stop_property_sequence(&mut self, name: &str) -> CoreResult<()> {
        Err(CoreError::NotSequenceable {
            device: self.name().to_string(),
            property: name.to_string(),
        })
    }
}
