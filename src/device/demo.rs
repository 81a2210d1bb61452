//! Simulated devices for tests and dry runs.
//!
//! These play the role real hardware never can in CI: deterministic
//! devices that satisfy the full contracts. [`DemoStateDevice`] is a
//! filter-wheel/LED-bank style discrete-state device; [`DemoCamera`] is a
//! snap-only camera with a deterministic gradient fill, so acquisition tests
//! can assert exact pixel values and the generic snap-to-sequence reduction
//! is exercised rather than bypassed. [`VecBufferProvider`] is the simplest
//! possible buffer collaborator: it allocates on demand and retains every
//! filled frame.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::property::{
    PropertyDescriptor, PropertyInfo, PropertyRegistry, PropertyType, PropertyValue,
};

use super::camera::{
    register_exposure_property, AcquisitionSupport, BufferProvider, CameraDevice,
    CameraPropertyHooks, FrameMetadata, PixelBuffer, PixelType, PropertyAccessor, Roi,
};
use super::state::{register_state_properties, StateDevice, StateMap};
use super::{Device, DeviceKind};

// =============================================================================
// DemoStateDevice
// =============================================================================

/// A simulated discrete-state device with a configurable position map and an
/// optional `Intensity` property.
pub struct DemoStateDevice {
    name: String,
    map: StateMap,
    position: usize,
    intensity: i64,
    props: Arc<PropertyRegistry<Self>>,
}

impl DemoStateDevice {
    /// Build a state device with the standard `State`/`Label` properties.
    pub fn new<I, S>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        Self::build(name, entries, false)
    }

    /// Build a state device that additionally exposes a writable
    /// `Intensity` property (0..=100).
    pub fn with_intensity<I, S>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        Self::build(name, entries, true)
    }

    fn build<I, S>(name: impl Into<String>, entries: I, intensity: bool) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        let name = name.into();
        let mut registry = PropertyRegistry::new(name.clone());
        register_state_properties(&mut registry);
        if intensity {
            registry.register(
                PropertyDescriptor::new("Intensity", PropertyType::Int, |d: &Self| {
                    Ok(PropertyValue::Int(d.intensity))
                })
                .with_setter(|d: &mut Self, value| {
                    if let PropertyValue::Int(v) = value {
                        d.intensity = v;
                    }
                    Ok(())
                })
                .with_limits(0.0, 100.0),
            );
        }
        Self {
            map: StateMap::new(name.clone(), entries),
            name,
            position: 0,
            intensity: 50,
            props: registry.into_shared(),
        }
    }
}

impl Device for DemoStateDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::State
    }

    fn property_names(&self) -> Vec<String> {
        self.props.names()
    }

    fn property_info(&self, name: &str) -> CoreResult<PropertyInfo> {
        self.props.info(name)
    }

    fn get_property(&self, name: &str) -> CoreResult<PropertyValue> {
        let props = Arc::clone(&self.props);
        props.get(self, name)
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> CoreResult<()> {
        let props = Arc::clone(&self.props);
        props.set(self, name, value)
    }
}

impl StateDevice for DemoStateDevice {
    fn state_map(&self) -> &StateMap {
        &self.map
    }

    fn state_map_mut(&mut self) -> &mut StateMap {
        &mut self.map
    }

    fn position(&self) -> usize {
        self.position
    }

    fn apply_position(&mut self, index: usize) -> CoreResult<()> {
        self.position = index;
        Ok(())
    }
}

// =============================================================================
// DemoCamera
// =============================================================================

/// A simulated snap-only camera.
///
/// Every frame is filled with the deterministic gradient
/// `pixel(row, col) = row * sensor_width + col` truncated to the pixel type,
/// so ROI-cropping tests can assert exact bytes. Declaring
/// [`AcquisitionSupport::Snap`] means sequences run through the generic
/// reduction, which is the code path under test.
pub struct DemoCamera {
    name: String,
    shape: (usize, usize),
    dtype: PixelType,
    exposure_ms: f64,
    binning: i64,
    roi: Option<Roi>,
    frames_acquired: u64,
    support: AcquisitionSupport,
    props: Arc<PropertyRegistry<Self>>,
}

impl DemoCamera {
    /// Build a camera with the given sensor shape (`(height, width)`) and
    /// pixel type.
    pub fn new(name: impl Into<String>, shape: (usize, usize), dtype: PixelType) -> Self {
        let name = name.into();
        let mut registry = PropertyRegistry::new(name.clone());
        register_exposure_property(&mut registry);
        CameraPropertyHooks {
            binning: Some(PropertyAccessor::read_write(
                |c: &Self| Ok(PropertyValue::Int(c.binning)),
                |c: &mut Self, value| {
                    if let PropertyValue::Int(v) = value {
                        c.binning = v;
                    }
                    Ok(())
                },
            )),
            camera_name: Some(PropertyAccessor::read_only(|c: &Self| {
                Ok(PropertyValue::Str(c.name.clone()))
            })),
            ccd_temperature: Some(PropertyAccessor::read_only(|_c: &Self| {
                Ok(PropertyValue::Float(-10.0))
            })),
            ..Default::default()
        }
        .register_into(&mut registry);

        Self {
            name,
            shape,
            dtype,
            exposure_ms: 10.0,
            binning: 1,
            roi: None,
            frames_acquired: 0,
            support: AcquisitionSupport::Snap,
            props: registry.into_shared(),
        }
    }

    /// Override the declared acquisition support (contract-validation
    /// tests only; the simulated snap stays available either way).
    pub fn declare_support(mut self, support: AcquisitionSupport) -> Self {
        self.support = support;
        self
    }

    /// Frames acquired so far.
    pub fn frames_acquired(&self) -> u64 {
        self.frames_acquired
    }

    fn fill_gradient(&self, buffer: &mut PixelBuffer) {
        let (height, width) = buffer.shape();
        let dtype = buffer.dtype();
        let bytes = buffer.as_bytes_mut();
        for row in 0..height {
            for col in 0..width {
                let value = row * width + col;
                let at = (row * width + col) * dtype.bytes_per_pixel();
                match dtype {
                    PixelType::U8 => bytes[at] = (value % 256) as u8,
                    PixelType::U16 => {
                        bytes[at..at + 2].copy_from_slice(&((value % 65536) as u16).to_le_bytes());
                    }
                    PixelType::F32 => {
                        bytes[at..at + 4].copy_from_slice(&(value as f32).to_le_bytes());
                    }
                }
            }
        }
    }
}

impl Device for DemoCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Camera
    }

    fn property_names(&self) -> Vec<String> {
        self.props.names()
    }

    fn property_info(&self, name: &str) -> CoreResult<PropertyInfo> {
        self.props.info(name)
    }

    fn get_property(&self, name: &str) -> CoreResult<PropertyValue> {
        let props = Arc::clone(&self.props);
        props.get(self, name)
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> CoreResult<()> {
        let props = Arc::clone(&self.props);
        props.set(self, name, value)
    }
}

impl CameraDevice for DemoCamera {
    fn sensor_shape(&self) -> (usize, usize) {
        self.shape
    }

    fn dtype(&self) -> PixelType {
        self.dtype
    }

    fn exposure(&self) -> f64 {
        self.exposure_ms
    }

    fn set_exposure(&mut self, exposure_ms: f64) -> CoreResult<()> {
        if exposure_ms <= 0.0 {
            return Err(CoreError::LimitViolation {
                property: super::camera::props::EXPOSURE.to_string(),
                value: exposure_ms,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        self.exposure_ms = exposure_ms;
        Ok(())
    }

    fn acquisition_support(&self) -> AcquisitionSupport {
        self.support
    }

    fn snap(&mut self, buffer: &mut PixelBuffer) -> CoreResult<FrameMetadata> {
        self.fill_gradient(buffer);
        self.frames_acquired += 1;
        Ok(FrameMetadata::now()
            .with_tag("Camera", self.name.clone())
            .with_tag("Frame", self.frames_acquired)
            .with_tag("Exposure-ms", self.exposure_ms))
    }

    fn roi(&self) -> Option<Roi> {
        self.roi
    }

    fn store_roi(&mut self, roi: Option<Roi>) {
        self.roi = roi;
    }
}

// =============================================================================
// VecBufferProvider
// =============================================================================

/// A buffer provider that allocates on demand and retains every filled
/// frame, in acquisition order.
#[derive(Default)]
pub struct VecBufferProvider {
    frames: Vec<PixelBuffer>,
}

impl VecBufferProvider {
    /// Frames filled so far.
    pub fn frames(&self) -> &[PixelBuffer] {
        &self.frames
    }
}

impl BufferProvider for VecBufferProvider {
    fn acquire(&mut self, shape: (usize, usize), dtype: PixelType) -> &mut PixelBuffer {
        self.frames.push(PixelBuffer::alloc(shape, dtype));
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_state_device_exposes_state_and_label() {
        let dev = DemoStateDevice::new("PyLED", [(0, "UV"), (1, "BLUE")]);
        assert_eq!(
            dev.property_names(),
            vec!["State".to_string(), "Label".to_string()]
        );
        assert_eq!(dev.get_property("Label").unwrap().to_string(), "UV");
    }

    #[test]
    fn intensity_property_is_optional() {
        let plain = DemoStateDevice::new("A", [(0, "X")]);
        assert!(plain.get_property("Intensity").is_err());

        let mut rich = DemoStateDevice::with_intensity("B", [(0, "X")]);
        rich.set_property("Intensity", PropertyValue::Str("100".into()))
            .unwrap();
        assert_eq!(
            rich.get_property("Intensity").unwrap(),
            PropertyValue::Int(100)
        );
    }

    #[test]
    fn demo_camera_registers_only_implemented_hooks() {
        let cam = DemoCamera::new("Cam", (8, 8), PixelType::U8);
        let names = cam.property_names();
        assert!(names.contains(&"Exposure".to_string()));
        assert!(names.contains(&"Binning".to_string()));
        assert!(names.contains(&"CameraName".to_string()));
        // Not hooked up, so not exposed.
        assert!(!names.contains(&"Gain".to_string()));
        assert!(!names.contains(&"ReadoutMode".to_string()));

        // CCDTemperature has no setter.
        let info = cam.property_info("CCDTemperature").unwrap();
        assert!(info.read_only);
    }

    #[test]
    fn snap_fills_the_gradient_and_counts_frames() {
        let mut cam = DemoCamera::new("Cam", (2, 4), PixelType::U8);
        let mut buf = PixelBuffer::alloc((2, 4), PixelType::U8);
        let meta = cam.snap(&mut buf).unwrap();
        assert_eq!(buf.as_bytes(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(meta.tag("Frame").and_then(|v| v.as_u64()), Some(1));
    }

    #[test]
    fn exposure_property_round_trips() {
        let mut cam = DemoCamera::new("Cam", (8, 8), PixelType::U16);
        cam.set_property("Exposure", PropertyValue::Str("250".into()))
            .unwrap();
        assert_eq!(cam.exposure(), 250.0);
        assert!(cam
            .set_property("Exposure", PropertyValue::Float(-5.0))
            .is_err());
    }
}
