//! Core facade.
//!
//! [`UniCore`] is the single entry point outer layers talk to. It owns the
//! device directory, the config store, the native-engine handle, the system
//! state cache and the event hub, and exposes label-addressed operations
//! that hide which population a device belongs to.
//!
//! Config-group operations (apply, detection, listings) live in the
//! `groups` module as further `impl UniCore` blocks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::device::camera::{FrameMetadata, PixelBuffer, Roi};
use crate::device::state::props as state_props;
use crate::directory::{DeviceDirectory, SoftwareDevice};
use crate::error::{CoreError, CoreResult};
use crate::events::{CoreEvent, EventHub};
use crate::native::{NativeEngine, NullNativeEngine};
use crate::property::{PropertyInfo, PropertyValue};
use crate::store::{ConfigStore, Setting};

/// How long [`UniCore::wait_for_device`] polls before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
/// Poll interval while a device reports busy.
const BUSY_POLL: Duration = Duration::from_millis(1);

/// Unified device-control core.
pub struct UniCore {
    pub(crate) engine: Arc<dyn NativeEngine>,
    pub(crate) directory: DeviceDirectory,
    pub(crate) store: ConfigStore,
    pub(crate) cache: BTreeMap<(String, String), String>,
    pub(crate) events: EventHub,
}

impl UniCore {
    /// Create a core with no native engine attached.
    pub fn new() -> Self {
        Self::with_engine(Arc::new(NullNativeEngine))
    }

    /// Create a core routing native operations to `engine`.
    pub fn with_engine(engine: Arc<dyn NativeEngine>) -> Self {
        Self {
            directory: DeviceDirectory::new(Arc::clone(&engine)),
            engine,
            store: ConfigStore::new(),
            cache: BTreeMap::new(),
            events: EventHub::new(),
        }
    }

    /// Subscribe to core events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// The device directory, for direct inspection.
    pub fn directory(&self) -> &DeviceDirectory {
        &self.directory
    }

    // -------------------------------------------------------------------------
    // Device lifecycle
    // -------------------------------------------------------------------------

    /// Load a software device under a label.
    pub fn load_device(
        &mut self,
        label: impl Into<String>,
        device: SoftwareDevice,
    ) -> CoreResult<()> {
        let label = label.into();
        self.directory.load(label.clone(), device)?;
        info!(device = %label, "device loaded");
        self.events.emit(CoreEvent::DeviceLoaded { device: label });
        Ok(())
    }

    /// Unload a software device, shutting it down first if needed.
    pub fn unload_device(&mut self, label: &str) -> CoreResult<()> {
        self.directory.unload(label)?;
        self.cache.retain(|(dev, _), _| dev != label);
        self.events.emit(CoreEvent::DeviceUnloaded {
            device: label.to_string(),
        });
        Ok(())
    }

    /// Initialize one device.
    pub fn initialize_device(&mut self, label: &str) -> CoreResult<()> {
        self.directory.initialize(label)?;
        self.events.emit(CoreEvent::DeviceInitialized {
            device: label.to_string(),
        });
        Ok(())
    }

    /// Initialize every loaded software device, in load order.
    pub fn initialize_all_devices(&mut self) -> CoreResult<()> {
        for label in self.directory.labels()? {
            self.initialize_device(&label)?;
        }
        Ok(())
    }

    /// Shut down every initialized software device.
    pub fn shutdown(&mut self) -> CoreResult<()> {
        self.directory.shutdown_all()
    }

    /// Every known device label, both populations.
    pub fn get_loaded_devices(&self) -> CoreResult<Vec<String>> {
        self.directory.labels()
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    /// Property names of a device.
    pub fn get_device_property_names(&self, label: &str) -> CoreResult<Vec<String>> {
        self.directory.property_names(label)
    }

    /// Introspection record for one property.
    pub fn get_property_info(&self, label: &str, property: &str) -> CoreResult<PropertyInfo> {
        self.directory.property_info(label, property)
    }

    /// Read a property value live from the device.
    pub fn get_property(&self, label: &str, property: &str) -> CoreResult<PropertyValue> {
        self.directory.get_property(label, property)
    }

    /// Read a property value without touching hardware: native devices
    /// answer from the engine's cache, software devices from the system
    /// state cache (falling back to a live read when never captured).
    pub fn get_property_from_cache(
        &self,
        label: &str,
        property: &str,
    ) -> CoreResult<PropertyValue> {
        if self.directory.is_native(label)? {
            return self
                .engine
                .get_cached_property(label, property)
                .map(PropertyValue::Str)
                .map_err(|e| CoreError::native(format!("get_cached_property '{label}/{property}'"), e));
        }
        if let Some(raw) = self.cache.get(&(label.to_string(), property.to_string())) {
            return Ok(PropertyValue::Str(raw.clone()));
        }
        self.directory.get_property(label, property)
    }

    /// Write a property value. The new value is recorded in the system
    /// state cache and announced as a `PropertyChanged` event.
    pub fn set_property(
        &mut self,
        label: &str,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> CoreResult<()> {
        let value = value.into();
        self.directory.set_property(label, property, value.clone())?;
        let wire = value.to_string();
        self.cache
            .insert((label.to_string(), property.to_string()), wire.clone());
        if property == state_props::STATE || property == state_props::LABEL {
            self.cache_state_pair(label);
        }
        debug!(device = label, property, value = %wire, "property set");
        self.events.emit(CoreEvent::PropertyChanged {
            device: label.to_string(),
            property: property.to_string(),
            value: wire,
        });
        Ok(())
    }

    /// Whether a property supports hardware value sequences.
    pub fn is_property_sequenceable(&self, label: &str, property: &str) -> CoreResult<bool> {
        self.directory.is_property_sequenceable(label, property)
    }

    /// Load a value sequence for a sequenceable property.
    pub fn load_property_sequence(
        &mut self,
        label: &str,
        property: &str,
        values: &[PropertyValue],
    ) -> CoreResult<()> {
        self.directory.load_property_sequence(label, property, values)
    }

    /// Start the loaded value sequence.
    pub fn start_property_sequence(&mut self, label: &str, property: &str) -> CoreResult<()> {
        self.directory.start_property_sequence(label, property)
    }

    /// Stop the running value sequence.
    pub fn stop_property_sequence(&mut self, label: &str, property: &str) -> CoreResult<()> {
        self.directory.stop_property_sequence(label, property)
    }

    // -------------------------------------------------------------------------
    // State devices
    // -------------------------------------------------------------------------

    /// Re-read both sides of a device's mirrored `State`/`Label` pair into
    /// the system state cache. A write to either side moves both, so the
    /// cache must never hold a pair the device never exposed.
    fn cache_state_pair(&mut self, label: &str) {
        for name in [state_props::STATE, state_props::LABEL] {
            if let Ok(live) = self.directory.get_property(label, name) {
                self.cache
                    .insert((label.to_string(), name.to_string()), live.to_string());
            }
        }
    }

    /// Current state index of a discrete-state device.
    pub fn get_state(&self, label: &str) -> CoreResult<usize> {
        self.directory.state(label)
    }

    /// Move a discrete-state device to an index.
    pub fn set_state(&mut self, label: &str, index: usize) -> CoreResult<()> {
        self.directory.set_state(label, index)?;
        self.cache_state_pair(label);
        self.events.emit(CoreEvent::PropertyChanged {
            device: label.to_string(),
            property: state_props::STATE.to_string(),
            value: index.to_string(),
        });
        Ok(())
    }

    /// Current state label of a discrete-state device.
    pub fn get_state_label(&self, label: &str) -> CoreResult<String> {
        self.directory.state_label(label)
    }

    /// Move a discrete-state device to a labeled position.
    pub fn set_state_label(&mut self, label: &str, state_label: &str) -> CoreResult<()> {
        self.directory.set_state_label(label, state_label)?;
        self.cache_state_pair(label);
        self.events.emit(CoreEvent::PropertyChanged {
            device: label.to_string(),
            property: state_props::LABEL.to_string(),
            value: state_label.to_string(),
        });
        Ok(())
    }

    /// All position labels of a discrete-state device, in index order.
    pub fn get_state_labels(&self, label: &str) -> CoreResult<Vec<String>> {
        self.directory.state_labels(label)
    }

    // -------------------------------------------------------------------------
    // Cameras
    // -------------------------------------------------------------------------

    /// Acquire a single frame from a software camera. The returned buffer is
    /// shaped to the camera's current (ROI-aware) shape; `snap` itself always
    /// receives a full-sensor buffer and the ROI window is cropped out of it.
    pub fn snap_image(&mut self, label: &str) -> CoreResult<(PixelBuffer, FrameMetadata)> {
        let camera = self.directory.camera_mut(label)?;
        let dtype = camera.dtype();
        let mut full = PixelBuffer::alloc(camera.sensor_shape(), dtype);
        let metadata = camera.snap(&mut full)?;
        match camera.roi() {
            None => Ok((full, metadata)),
            Some(roi) => {
                let mut out = PixelBuffer::alloc(roi.shape(), dtype);
                out.copy_region_from(&full, roi);
                Ok((out, metadata))
            }
        }
    }

    /// Active ROI of a software camera, if one is set.
    pub fn get_roi(&self, label: &str) -> CoreResult<Option<Roi>> {
        Ok(self.directory.camera(label)?.roi())
    }

    /// Set the ROI of a software camera. Rejected (leaving the previous ROI
    /// in place) when the rectangle does not fit the sensor.
    pub fn set_roi(
        &mut self,
        label: &str,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
    ) -> CoreResult<()> {
        self.directory.camera_mut(label)?.set_roi(x, y, width, height)?;
        self.events.emit(CoreEvent::RoiChanged {
            device: label.to_string(),
        });
        Ok(())
    }

    /// Restore a software camera to its full sensor.
    pub fn clear_roi(&mut self, label: &str) -> CoreResult<()> {
        self.directory.camera_mut(label)?.clear_roi();
        self.events.emit(CoreEvent::RoiChanged {
            device: label.to_string(),
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Busy / waiting
    // -------------------------------------------------------------------------

    /// Whether a device is still processing a previous command.
    pub fn device_busy(&self, label: &str) -> CoreResult<bool> {
        self.directory.busy(label)
    }

    /// Block until a device reports not-busy, with a bounded poll.
    pub fn wait_for_device(&self, label: &str) -> CoreResult<()> {
        let deadline = Instant::now() + BUSY_TIMEOUT;
        while self.directory.busy(label)? {
            if Instant::now() >= deadline {
                warn!(device = label, "device still busy after wait timeout");
                return Err(CoreError::ContractViolation {
                    device: label.to_string(),
                    message: "still busy after wait timeout".to_string(),
                });
            }
            std::thread::sleep(BUSY_POLL);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // System state
    // -------------------------------------------------------------------------

    /// Every (device, property, value) triple, read live from each device.
    pub fn get_system_state(&self) -> CoreResult<Vec<Setting>> {
        let mut state = Vec::new();
        for label in self.directory.labels()? {
            for property in self.directory.property_names(&label)? {
                let value = self.directory.get_property(&label, &property)?;
                state.push(Setting::new(&label, &property, value.to_string()));
            }
        }
        Ok(state)
    }

    /// Re-capture the system state cache: live reads for software devices,
    /// the engine's own state cache for native devices.
    pub fn update_system_state_cache(&mut self) -> CoreResult<()> {
        let mut state = Vec::new();
        for label in self.directory.labels()? {
            let native = self.directory.is_native(&label)?;
            for property in self.directory.property_names(&label)? {
                let value = if native {
                    self.engine
                        .get_cached_property(&label, &property)
                        .map_err(|e| CoreError::native("get_cached_property", e))?
                } else {
                    self.directory.get_property(&label, &property)?.to_string()
                };
                state.push(((label.clone(), property), value));
            }
        }
        self.cache.clear();
        let entries = state.len();
        for (key, value) in state {
            self.cache.insert(key, value);
        }
        debug!(entries, "system state cache updated");
        self.events.emit(CoreEvent::SystemStateCacheUpdated);
        Ok(())
    }

    /// The last captured system state, without touching hardware.
    pub fn get_system_state_cache(&self) -> Vec<Setting> {
        self.cache
            .iter()
            .map(|((device, property), value)| Setting::new(device, property, value))
            .collect()
    }
}

impl Default for UniCore {
    fn default() -> Self {
        Self::new()
    }
}
