//! Unified device directory.
//!
//! The directory maps device labels to their backing implementation and is
//! the single dispatch point between the two device populations: native
//! devices owned by the external hardware-abstraction engine, and software
//! devices implemented in-process. Every label-addressed operation issued by
//! outer layers (property get/set, state get/set, camera access, busy
//! queries) routes through here, and native-ness never leaks past this
//! boundary: callers cannot tell which backing a label has.
//!
//! The directory also owns the software-device lifecycle
//! (loaded → initialized → shut down) and performs the one-time camera
//! contract validation at initialization: a camera implementation providing
//! neither `snap` nor `start_sequence` fails `initialize`, not its first
//! acquisition.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::camera::CameraDevice;
use crate::device::state::StateDevice;
use crate::device::{Device, DeviceKind};
use crate::error::{CoreError, CoreResult};
use crate::native::NativeEngine;
use crate::property::{PropertyInfo, PropertyType, PropertyValue};

// =============================================================================
// Software device union
// =============================================================================

/// A software-defined device, tagged by contract so kind-specific operations
/// can be routed without downcasting.
pub enum SoftwareDevice {
    /// A device with only the base contract.
    Generic(Box<dyn Device>),
    /// A discrete-state device.
    State(Box<dyn StateDevice>),
    /// A camera.
    Camera(Box<dyn CameraDevice>),
}

impl SoftwareDevice {
    /// View through the base contract.
    pub fn device(&self) -> &dyn Device {
        match self {
            SoftwareDevice::Generic(d) => d.as_ref(),
            SoftwareDevice::State(d) => d.as_ref(),
            SoftwareDevice::Camera(d) => d.as_ref(),
        }
    }

    /// Mutable view through the base contract.
    pub fn device_mut(&mut self) -> &mut dyn Device {
        match self {
            SoftwareDevice::Generic(d) => d.as_mut(),
            SoftwareDevice::State(d) => d.as_mut(),
            SoftwareDevice::Camera(d) => d.as_mut(),
        }
    }

    fn kind(&self) -> DeviceKind {
        match self {
            SoftwareDevice::Generic(_) => DeviceKind::Generic,
            SoftwareDevice::State(_) => DeviceKind::State,
            SoftwareDevice::Camera(_) => DeviceKind::Camera,
        }
    }
}

/// Lifecycle state of a loaded device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Loaded into the directory, not yet initialized.
    Loaded,
    /// Initialized and ready for operations.
    Initialized,
    /// Shut down; awaiting unload.
    ShutDown,
}

struct Entry {
    label: String,
    device: SoftwareDevice,
    lifecycle: LifecycleState,
}

// =============================================================================
// Directory
// =============================================================================

/// Label-addressed registry over both device populations.
pub struct DeviceDirectory {
    engine: Arc<dyn NativeEngine>,
    entries: Vec<Entry>,
}

impl DeviceDirectory {
    /// Create a directory routing native labels to `engine`.
    pub fn new(engine: Arc<dyn NativeEngine>) -> Self {
        Self {
            engine,
            entries: Vec::new(),
        }
    }

    fn entry(&self, label: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.label == label)
    }

    fn entry_mut(&mut self, label: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.label == label)
    }

    fn native_labels(&self) -> CoreResult<Vec<String>> {
        self.engine
            .loaded_devices()
            .map_err(|e| CoreError::native("loaded_devices", e))
    }

    /// Whether the label resolves to a device backed by the native engine.
    pub fn is_native(&self, label: &str) -> CoreResult<bool> {
        if self.entry(label).is_some() {
            return Ok(false);
        }
        Ok(self.native_labels()?.iter().any(|l| l == label))
    }

    /// Whether any device, software or native, is loaded under the label.
    pub fn contains(&self, label: &str) -> CoreResult<bool> {
        Ok(self.entry(label).is_some() || self.is_native(label)?)
    }

    fn require_known(&self, label: &str) -> CoreResult<()> {
        if self.contains(label)? {
            Ok(())
        } else {
            Err(CoreError::DeviceNotFound {
                device: label.to_string(),
            })
        }
    }

    /// Load a software device under a label. The label must be unused by
    /// both populations.
    pub fn load(&mut self, label: impl Into<String>, device: SoftwareDevice) -> CoreResult<()> {
        let label = label.into();
        if self.contains(&label)? {
            return Err(CoreError::DuplicateDevice { device: label });
        }
        debug!(label = %label, kind = device.kind().label(), "loading device");
        self.entries.push(Entry {
            label,
            device,
            lifecycle: LifecycleState::Loaded,
        });
        Ok(())
    }

    /// Unload a software device, shutting it down first if needed.
    pub fn unload(&mut self, label: &str) -> CoreResult<()> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.label == label)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device: label.to_string(),
            })?;
        if self.entries[idx].lifecycle == LifecycleState::Initialized {
            self.entries[idx].device.device_mut().shutdown()?;
        }
        debug!(label, "unloading device");
        self.entries.remove(idx);
        Ok(())
    }

    /// Every known device label: software devices in load order, then
    /// native devices not shadowed by a software label.
    pub fn labels(&self) -> CoreResult<Vec<String>> {
        let mut labels: Vec<String> = self.entries.iter().map(|e| e.label.clone()).collect();
        for native in self.native_labels()? {
            if !labels.contains(&native) {
                labels.push(native);
            }
        }
        Ok(labels)
    }

    /// Lifecycle state of a software device.
    pub fn lifecycle(&self, label: &str) -> CoreResult<LifecycleState> {
        self.entry(label)
            .map(|e| e.lifecycle)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device: label.to_string(),
            })
    }

    /// Initialize one software device.
    ///
    /// Runs the device's `initialize` hook and, for cameras, the one-time
    /// acquisition-contract validation. Native devices are initialized by
    /// the engine itself and are accepted as a no-op here.
    pub fn initialize(&mut self, label: &str) -> CoreResult<()> {
        if self.entry(label).is_none() {
            // Accept native labels; their lifecycle belongs to the engine.
            self.require_known(label)?;
            return Ok(());
        }
        // Contract check before the device hook so a broken camera never
        // runs initialization side effects.
        if let Some(entry) = self.entry(label) {
            if let SoftwareDevice::Camera(cam) = &entry.device {
                if !cam.acquisition_support().is_valid() {
                    return Err(CoreError::ContractViolation {
                        device: label.to_string(),
                        message: "must implement snap() or start_sequence()".to_string(),
                    });
                }
            }
        }
        if let Some(entry) = self.entry_mut(label) {
            entry.device.device_mut().initialize()?;
            entry.lifecycle = LifecycleState::Initialized;
            debug!(label, "device initialized");
        }
        Ok(())
    }

    /// Initialize every loaded software device, in load order.
    pub fn initialize_all(&mut self) -> CoreResult<()> {
        let labels: Vec<String> = self.entries.iter().map(|e| e.label.clone()).collect();
        for label in labels {
            self.initialize(&label)?;
        }
        Ok(())
    }

    /// Shut down every initialized software device, in reverse load order.
    pub fn shutdown_all(&mut self) -> CoreResult<()> {
        for entry in self.entries.iter_mut().rev() {
            if entry.lifecycle == LifecycleState::Initialized {
                entry.device.device_mut().shutdown()?;
                entry.lifecycle = LifecycleState::ShutDown;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Property routing
    // -------------------------------------------------------------------------

    /// Property names of a device, either population.
    pub fn property_names(&self, label: &str) -> CoreResult<Vec<String>> {
        if let Some(entry) = self.entry(label) {
            return Ok(entry.device.device().property_names());
        }
        self.require_known(label)?;
        self.engine
            .device_property_names(label)
            .map_err(|e| CoreError::native("device_property_names", e))
    }

    /// Introspection record for a property. Native properties are reported
    /// as writable strings; the engine owns their real typing.
    pub fn property_info(&self, label: &str, property: &str) -> CoreResult<PropertyInfo> {
        if let Some(entry) = self.entry(label) {
            return entry.device.device().property_info(property);
        }
        self.require_known(label)?;
        let names = self
            .engine
            .device_property_names(label)
            .map_err(|e| CoreError::native("device_property_names", e))?;
        if !names.iter().any(|n| n == property) {
            return Err(CoreError::PropertyNotFound {
                device: label.to_string(),
                property: property.to_string(),
            });
        }
        Ok(PropertyInfo {
            name: property.to_string(),
            ty: PropertyType::String,
            read_only: false,
            allowed_values: None,
            limits: None,
            sequenceable: false,
        })
    }

    /// Read a property value, either population.
    pub fn get_property(&self, label: &str, property: &str) -> CoreResult<PropertyValue> {
        if let Some(entry) = self.entry(label) {
            return entry.device.device().get_property(property);
        }
        self.require_known(label)?;
        self.engine
            .get_property(label, property)
            .map(PropertyValue::Str)
            .map_err(|e| CoreError::native(format!("get_property '{label}/{property}'"), e))
    }

    /// Write a property value, either population. Coercion/validation for
    /// software devices happens in the device's registry; native values
    /// travel as wire strings through the engine's own path.
    pub fn set_property(
        &mut self,
        label: &str,
        property: &str,
        value: PropertyValue,
    ) -> CoreResult<()> {
        if let Some(entry) = self.entry_mut(label) {
            return entry.device.device_mut().set_property(property, value);
        }
        self.require_known(label)?;
        self.engine
            .set_property(label, property, &value.to_string())
            .map_err(|e| CoreError::native(format!("set_property '{label}/{property}'"), e))
    }

    /// Whether a property supports hardware value sequences. Native
    /// sequencing stays engine-internal, so native labels answer `false`.
    pub fn is_property_sequenceable(&self, label: &str, property: &str) -> CoreResult<bool> {
        if let Some(entry) = self.entry(label) {
            return entry.device.device().is_property_sequenceable(property);
        }
        self.require_known(label)?;
        Ok(false)
    }

    /// Load a value sequence for a sequenceable software property.
    pub fn load_property_sequence(
        &mut self,
        label: &str,
        property: &str,
        values: &[PropertyValue],
    ) -> CoreResult<()> {
        if let Some(entry) = self.entry_mut(label) {
            return entry
                .device
                .device_mut()
                .load_property_sequence(property, values);
        }
        self.require_known(label)?;
        Err(CoreError::NotSequenceable {
            device: label.to_string(),
            property: property.to_string(),
        })
    }

    /// Start the loaded value sequence on a software property.
    pub fn start_property_sequence(&mut self, label: &str, property: &str) -> CoreResult<()> {
        if let Some(entry) = self.entry_mut(label) {
            return entry.device.device_mut().start_property_sequence(property);
        }
        self.require_known(label)?;
        Err(CoreError::NotSequenceable {
            device: label.to_string(),
            property: property.to_string(),
        })
    }

    /// Stop the running value sequence on a software property.
    pub fn stop_property_sequence(&mut self, label: &str, property: &str) -> CoreResult<()> {
        if let Some(entry) = self.entry_mut(label) {
            return entry.device.device_mut().stop_property_sequence(property);
        }
        self.require_known(label)?;
        Err(CoreError::NotSequenceable {
            device: label.to_string(),
            property: property.to_string(),
        })
    }

    /// Whether a device is still processing a previous command.
    pub fn busy(&self, label: &str) -> CoreResult<bool> {
        if let Some(entry) = self.entry(label) {
            return Ok(entry.device.device().busy());
        }
        self.require_known(label)?;
        self.engine
            .is_busy(label)
            .map_err(|e| CoreError::native(format!("is_busy '{label}'"), e))
    }

    // -------------------------------------------------------------------------
    // State routing
    // -------------------------------------------------------------------------

    fn state_device(&self, label: &str) -> CoreResult<&dyn StateDevice> {
        match self.entry(label) {
            Some(Entry {
                device: SoftwareDevice::State(dev),
                ..
            }) => Ok(dev.as_ref()),
            Some(_) => Err(CoreError::WrongDeviceKind {
                device: label.to_string(),
                expected: DeviceKind::State.label().to_string(),
            }),
            None => Err(CoreError::DeviceNotFound {
                device: label.to_string(),
            }),
        }
    }

    fn state_device_mut(&mut self, label: &str) -> CoreResult<&mut dyn StateDevice> {
        match self.entry_mut(label) {
            Some(Entry {
                device: SoftwareDevice::State(dev),
                ..
            }) => Ok(dev.as_mut()),
            Some(_) => Err(CoreError::WrongDeviceKind {
                device: label.to_string(),
                expected: DeviceKind::State.label().to_string(),
            }),
            None => Err(CoreError::DeviceNotFound {
                device: label.to_string(),
            }),
        }
    }

    /// Current state index of a discrete-state device. Native state devices
    /// answer through their `State` property.
    pub fn state(&self, label: &str) -> CoreResult<usize> {
        if self.entry(label).is_none() && self.is_native(label)? {
            let raw = self.get_property(label, crate::device::state::props::STATE)?;
            return match raw.as_f64() {
                Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
                _ => Err(CoreError::TypeCoercion {
                    value: raw.to_string(),
                    target: PropertyType::Int.to_string(),
                }),
            };
        }
        Ok(self.state_device(label)?.position())
    }

    /// Move a discrete-state device to an index.
    pub fn set_state(&mut self, label: &str, index: usize) -> CoreResult<()> {
        if self.entry(label).is_none() && self.is_native(label)? {
            return self.set_property(
                label,
                crate::device::state::props::STATE,
                PropertyValue::Int(index as i64),
            );
        }
        self.state_device_mut(label)?.set_position(index)
    }

    /// Current state label of a discrete-state device.
    pub fn state_label(&self, label: &str) -> CoreResult<String> {
        if self.entry(label).is_none() && self.is_native(label)? {
            return Ok(self
                .get_property(label, crate::device::state::props::LABEL)?
                .to_string());
        }
        self.state_device(label)?.position_label()
    }

    /// Move a discrete-state device to a labeled position.
    pub fn set_state_label(&mut self, label: &str, state_label: &str) -> CoreResult<()> {
        if self.entry(label).is_none() && self.is_native(label)? {
            return self.set_property(
                label,
                crate::device::state::props::LABEL,
                PropertyValue::Str(state_label.to_string()),
            );
        }
        self.state_device_mut(label)?.set_position_label(state_label)
    }

    /// All position labels of a software discrete-state device, in index
    /// order.
    pub fn state_labels(&self, label: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .state_device(label)?
            .state_map()
            .entries()
            .map(|(_, l)| l.to_string())
            .collect())
    }

    // -------------------------------------------------------------------------
    // Camera routing
    // -------------------------------------------------------------------------

    /// Shared access to a software camera.
    pub fn camera(&self, label: &str) -> CoreResult<&dyn CameraDevice> {
        match self.entry(label) {
            Some(Entry {
                device: SoftwareDevice::Camera(dev),
                ..
            }) => Ok(dev.as_ref()),
            Some(_) => Err(CoreError::WrongDeviceKind {
                device: label.to_string(),
                expected: DeviceKind::Camera.label().to_string(),
            }),
            None => Err(CoreError::DeviceNotFound {
                device: label.to_string(),
            }),
        }
    }

    /// Exclusive access to a software camera.
    pub fn camera_mut(&mut self, label: &str) -> CoreResult<&mut dyn CameraDevice> {
        match self.entry_mut(label) {
            Some(Entry {
                device: SoftwareDevice::Camera(dev),
                ..
            }) => Ok(dev.as_mut()),
            Some(_) => Err(CoreError::WrongDeviceKind {
                device: label.to_string(),
                expected: DeviceKind::Camera.label().to_string(),
            }),
            None => Err(CoreError::DeviceNotFound {
                device: label.to_string(),
            }),
        }
    }
}
