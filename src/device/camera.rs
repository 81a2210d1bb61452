//! Camera device contract and the generic acquisition protocol.
//!
//! A camera declares an immutable sensor shape and pixel type, exposes
//! exposure control, and satisfies the acquisition contract: implement
//! [`CameraDevice::snap`] (fill one full-sensor buffer) or override
//! [`CameraDevice::start_sequence`] (full control over the loop, e.g.
//! hardware-triggered acquisition). Which of the two an implementation
//! provides is declared explicitly through
//! [`CameraDevice::acquisition_support`] and validated once, when the device
//! directory initializes the device — a camera providing neither fails
//! initialization with a contract-violation error instead of failing lazily
//! mid-acquisition.
//!
//! The default `start_sequence` is the generic ROI reduction: with no active
//! ROI, each frame is snapped straight into a full-sensor buffer obtained
//! from the caller's [`BufferProvider`] (zero extra copies). With an ROI
//! active, frames are snapped into an internally retained full-sensor
//! scratch buffer and only the ROI window is copied into a region-shaped
//! output buffer. Any ROI-unaware camera becomes ROI-capable at zero cost to
//! the implementer.
//!
//! Sequences are lazy and pull-driven: each element is produced when the
//! iterator is polled, an indefinite sequence (`n = None`) never blocks
//! between pulls, and cancellation is simply dropping the iterator. No
//! background thread is implied and no timeout is applied; a camera that
//! hangs in `snap` hangs its caller.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::property::{
    Getter, PropertyDescriptor, PropertyRegistry, PropertyType, PropertyValue, Setter,
};

use super::Device;

/// Names of the standard camera properties.
pub mod props {
    /// Exposure time in milliseconds. Always registered.
    pub const EXPOSURE: &str = "Exposure";
    /// Pixel binning factor.
    pub const BINNING: &str = "Binning";
    /// Analog gain.
    pub const GAIN: &str = "Gain";
    /// Electron-multiplying gain.
    pub const EM_GAIN: &str = "EMGain";
    /// Analog offset.
    pub const OFFSET: &str = "Offset";
    /// Sensor temperature, degrees C.
    pub const CCD_TEMPERATURE: &str = "CCDTemperature";
    /// Sensor temperature set point, degrees C.
    pub const CCD_TEMPERATURE_SET_POINT: &str = "CCDTemperatureSetPoint";
    /// Readout mode label.
    pub const READOUT_MODE: &str = "ReadoutMode";
    /// Readout time in milliseconds.
    pub const READOUT_TIME: &str = "ReadoutTime";
    /// Camera model name.
    pub const CAMERA_NAME: &str = "CameraName";
    /// Camera serial/identifier.
    pub const CAMERA_ID: &str = "CameraID";
}

// =============================================================================
// Pixel buffers
// =============================================================================

/// Pixel data type of an image buffer.
///
/// Buffers are kept in the sensor's native depth; converting a 16-bit frame
/// to floats belongs to processing layers, not the acquisition path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelType {
    /// 8-bit unsigned integer pixels.
    U8,
    /// 16-bit unsigned integer pixels.
    U16,
    /// 32-bit floating point pixels (computed images).
    F32,
}

impl PixelType {
    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 => 2,
            PixelType::F32 => 4,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PixelType::U8 => "u8",
            PixelType::U16 => "u16",
            PixelType::F32 => "f32",
        };
        write!(f, "{label}")
    }
}

/// An owned image buffer tagged with its shape and pixel type.
///
/// Shape convention is `(height, width)`, matching sensor row-major layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    dtype: PixelType,
    shape: (usize, usize),
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer for the given shape and pixel type.
    pub fn alloc(shape: (usize, usize), dtype: PixelType) -> Self {
        let (height, width) = shape;
        Self {
            dtype,
            shape,
            data: vec![0; height * width * dtype.bytes_per_pixel()],
        }
    }

    /// Buffer shape as `(height, width)`.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Pixel type.
    pub fn dtype(&self) -> PixelType {
        self.dtype
    }

    /// Raw bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw bytes, row-major. Cameras fill frames through this view.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy the `roi` window of `src` (a full-sensor buffer) into this
    /// region-shaped buffer.
    ///
    /// Shapes are the caller's contract: `self` must be `(roi.height,
    /// roi.width)` and `src` must contain the window.
    pub fn copy_region_from(&mut self, src: &PixelBuffer, roi: Roi) {
        debug_assert_eq!(self.dtype, src.dtype);
        debug_assert_eq!(self.shape, (roi.height, roi.width));
        let bpp = self.dtype.bytes_per_pixel();
        let (_, src_width) = src.shape;
        let row_bytes = roi.width * bpp;
        for row in 0..roi.height {
            let src_start = ((roi.y + row) * src_width + roi.x) * bpp;
            let dst_start = row * row_bytes;
            self.data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&src.data[src_start..src_start + row_bytes]);
        }
    }
}

// =============================================================================
// ROI
// =============================================================================

/// A rectangular region of interest in sensor pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    /// Origin column.
    pub x: usize,
    /// Origin row.
    pub y: usize,
    /// Region width in pixels.
    pub width: usize,
    /// Region height in pixels.
    pub height: usize,
}

impl Roi {
    /// Validate a requested rectangle against a sensor shape
    /// (`(height, width)`).
    ///
    /// The invariant: non-negative origin, positive extent,
    /// `x + width <= sensor_width`, `y + height <= sensor_height`.
    pub fn validate(
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        sensor_shape: (usize, usize),
    ) -> CoreResult<Self> {
        let (sensor_height, sensor_width) = sensor_shape;
        let invalid = || CoreError::InvalidRoi {
            x,
            y,
            width,
            height,
            sensor_width,
            sensor_height,
        };
        if x < 0 || y < 0 || width <= 0 || height <= 0 {
            return Err(invalid());
        }
        let (x, y) = (x as usize, y as usize);
        let (width, height) = (width as usize, height as usize);
        if x + width > sensor_width || y + height > sensor_height {
            return Err(invalid());
        }
        Ok(Roi {
            x,
            y,
            width,
            height,
        })
    }

    /// Region shape as `(height, width)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

// =============================================================================
// Frame metadata
// =============================================================================

/// Metadata attached to one acquired frame: a UTC timestamp plus free-form
/// key/value tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Acquisition timestamp.
    pub timestamp: DateTime<Utc>,
    /// Camera-specific tags (frame number, readout mode, hardware counters).
    pub tags: serde_json::Map<String, serde_json::Value>,
}

impl FrameMetadata {
    /// Metadata stamped with the current time and no tags.
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            tags: serde_json::Map::new(),
        }
    }

    /// Attach a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Look up a tag.
    pub fn tag(&self, key: &str) -> Option<&serde_json::Value> {
        self.tags.get(key)
    }
}

// =============================================================================
// Acquisition contract
// =============================================================================

/// Which acquisition entry points a camera implementation provides.
///
/// Declared explicitly at construction instead of probing which methods were
/// overridden; the directory validates at initialization that at least one
/// is provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionSupport {
    /// The camera implements `snap`; sequences use the generic reduction.
    Snap,
    /// The camera overrides `start_sequence` (hardware-controlled loop).
    Sequence,
    /// The camera implements both.
    Both,
    /// The camera implements neither (fails contract validation).
    Neither,
}

impl AcquisitionSupport {
    /// True when either entry point is provided.
    pub fn is_valid(&self) -> bool {
        !matches!(self, AcquisitionSupport::Neither)
    }
}

/// Supplies acquisition buffers and retains the filled frames.
///
/// The provider is typically backed by a circular buffer owned by the
/// caller; the core only requests correctly shaped buffers from it and
/// fills them.
pub trait BufferProvider {
    /// Hand out a buffer of the given shape and pixel type. The returned
    /// buffer stays owned by the provider; the camera fills it in place.
    fn acquire(&mut self, shape: (usize, usize), dtype: PixelType) -> &mut PixelBuffer;
}

/// A pull-driven acquisition sequence.
pub type SequenceHandle<'a> = Box<dyn Iterator<Item = CoreResult<FrameMetadata>> + 'a>;

/// Contract for camera devices.
pub trait CameraDevice: Device {
    /// Full sensor shape as `(height, width)`. Immutable per device.
    fn sensor_shape(&self) -> (usize, usize);

    /// Pixel data type of acquired frames.
    fn dtype(&self) -> PixelType;

    /// Current exposure time in milliseconds.
    fn exposure(&self) -> f64;

    /// Set the exposure time in milliseconds.
    fn set_exposure(&mut self, exposure_ms: f64) -> CoreResult<()>;

    /// Which acquisition entry points this implementation provides.
    fn acquisition_support(&self) -> AcquisitionSupport;

    /// Fill the provided full-sensor buffer with one frame and return its
    /// metadata. Cameras declaring [`AcquisitionSupport::Sequence`] only may
    /// leave the default, which reports the missing entry point.
    fn snap(&mut self, buffer: &mut PixelBuffer) -> CoreResult<FrameMetadata> {
        let _ = buffer;
        Err(CoreError::ContractViolation {
            device: self.name().to_string(),
            message: "snap() requested but not implemented".to_string(),
        })
    }

    /// Start an acquisition sequence of `n` frames (`None` = indefinite).
    ///
    /// The default is the generic reduction over `snap` described in the
    /// module docs; override only when the camera needs full control over
    /// the acquisition loop.
    fn start_sequence<'a>(
        &'a mut self,
        n: Option<usize>,
        provider: &'a mut dyn BufferProvider,
    ) -> CoreResult<SequenceHandle<'a>> {
        Ok(Box::new(SnapSequence::new(self, n, provider)))
    }

    /// The active ROI, if any.
    fn roi(&self) -> Option<Roi>;

    /// Raw ROI storage hook. Only `set_roi`/`clear_roi` may call this; the
    /// bounds invariant holds because every write goes through validation.
    fn store_roi(&mut self, roi: Option<Roi>);

    /// Set the ROI, validating against the sensor shape. On failure the
    /// previous ROI (or its absence) is left unchanged.
    fn set_roi(&mut self, x: i64, y: i64, width: i64, height: i64) -> CoreResult<()> {
        let roi = Roi::validate(x, y, width, height, self.sensor_shape())?;
        self.store_roi(Some(roi));
        Ok(())
    }

    /// Return to full-frame acquisition.
    fn clear_roi(&mut self) {
        self.store_roi(None);
    }

    /// The shape callers must size acquisition buffers with: the ROI extent
    /// when one is set, the full sensor shape otherwise.
    fn current_shape(&self) -> (usize, usize) {
        match self.roi() {
            Some(roi) => roi.shape(),
            None => self.sensor_shape(),
        }
    }
}

// =============================================================================
// Generic snap -> sequence reduction
// =============================================================================

/// Lazy sequence that reduces `snap` to the full acquisition protocol.
///
/// Holds the camera and provider for the duration of the sequence; dropping
/// the iterator cancels acquisition. The full-sensor scratch buffer used for
/// ROI cropping is allocated on first use and reused across frames.
pub struct SnapSequence<'a, C: CameraDevice + ?Sized> {
    camera: &'a mut C,
    provider: &'a mut dyn BufferProvider,
    remaining: Option<usize>,
    scratch: Option<PixelBuffer>,
    finished: bool,
}

impl<'a, C: CameraDevice + ?Sized> SnapSequence<'a, C> {
    /// Wrap a snap-capable camera into a lazy sequence of `n` frames
    /// (`None` = run until dropped).
    pub fn new(camera: &'a mut C, n: Option<usize>, provider: &'a mut dyn BufferProvider) -> Self {
        Self {
            camera,
            provider,
            remaining: n,
            scratch: None,
            finished: false,
        }
    }

    fn acquire_one(&mut self) -> CoreResult<FrameMetadata> {
        let dtype = self.camera.dtype();
        let sensor = self.camera.sensor_shape();
        match self.camera.roi() {
            None => {
                // Full frame: snap straight into the output buffer.
                let out = self.provider.acquire(sensor, dtype);
                self.camera.snap(out)
            }
            Some(roi) => {
                // ROI active: snap into the retained scratch buffer, then
                // copy only the window into a region-shaped output buffer.
                let scratch = match &mut self.scratch {
                    Some(buf) if buf.shape() == sensor && buf.dtype() == dtype => buf,
                    slot => slot.insert(PixelBuffer::alloc(sensor, dtype)),
                };
                let meta = self.camera.snap(scratch)?;
                let out = self.provider.acquire(roi.shape(), dtype);
                out.copy_region_from(scratch, roi);
                Ok(meta)
            }
        }
    }
}

impl<C: CameraDevice + ?Sized> Iterator for SnapSequence<'_, C> {
    type Item = CoreResult<FrameMetadata>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.remaining == Some(0) {
            return None;
        }
        let item = self.acquire_one();
        match &item {
            Ok(_) => {
                if let Some(n) = &mut self.remaining {
                    *n -= 1;
                }
            }
            // A failed snap ends the sequence; the error is still yielded.
            Err(_) => self.finished = true,
        }
        Some(item)
    }
}

// =============================================================================
// Standard camera properties
// =============================================================================

/// Access closures for one optional standard property.
pub struct PropertyAccessor<D> {
    /// Read closure.
    pub getter: Getter<D>,
    /// Optional write closure; absence makes the property read-only.
    pub setter: Option<Setter<D>>,
}

impl<D> PropertyAccessor<D> {
    /// A read-only accessor.
    pub fn read_only(
        getter: impl Fn(&D) -> CoreResult<PropertyValue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            getter: Box::new(getter),
            setter: None,
        }
    }

    /// A read-write accessor.
    pub fn read_write(
        getter: impl Fn(&D) -> CoreResult<PropertyValue> + Send + Sync + 'static,
        setter: impl Fn(&mut D, PropertyValue) -> CoreResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            getter: Box::new(getter),
            setter: Some(Box::new(setter)),
        }
    }
}

/// Optional standard-property hooks, filled at construction.
///
/// Each present accessor registers the corresponding standard property; an
/// absent one means the capability is unsupported and the property is simply
/// not exposed. This keeps the mandatory camera interface small while the
/// property vocabulary stays common across implementations:
///
/// ```rust,ignore
/// let hooks = CameraPropertyHooks {
///     binning: Some(PropertyAccessor::read_write(
///         |c: &MyCam| Ok(PropertyValue::Int(c.binning)),
///         |c, v| { c.binning = v.as_f64().unwrap_or(1.0) as i64; Ok(()) },
///     )),
///     ..Default::default()
/// };
/// hooks.register_into(&mut registry);
/// ```
pub struct CameraPropertyHooks<D> {
    /// `Binning` (int).
    pub binning: Option<PropertyAccessor<D>>,
    /// `Gain` (float).
    pub gain: Option<PropertyAccessor<D>>,
    /// `EMGain` (float).
    pub em_gain: Option<PropertyAccessor<D>>,
    /// `Offset` (float).
    pub offset: Option<PropertyAccessor<D>>,
    /// `CCDTemperature` (float).
    pub ccd_temperature: Option<PropertyAccessor<D>>,
    /// `CCDTemperatureSetPoint` (float).
    pub ccd_temperature_set_point: Option<PropertyAccessor<D>>,
    /// `ReadoutMode` (enum).
    pub readout_mode: Option<PropertyAccessor<D>>,
    /// `ReadoutTime` (float).
    pub readout_time: Option<PropertyAccessor<D>>,
    /// `CameraName` (string).
    pub camera_name: Option<PropertyAccessor<D>>,
    /// `CameraID` (string).
    pub camera_id: Option<PropertyAccessor<D>>,
}

impl<D> Default for CameraPropertyHooks<D> {
    fn default() -> Self {
        Self {
            binning: None,
            gain: None,
            em_gain: None,
            offset: None,
            ccd_temperature: None,
            ccd_temperature_set_point: None,
            readout_mode: None,
            readout_time: None,
            camera_name: None,
            camera_id: None,
        }
    }
}

impl<D> CameraPropertyHooks<D> {
    /// Register every present accessor under its standard name.
    pub fn register_into(self, registry: &mut PropertyRegistry<D>) {
        let entries: [(&str, PropertyType, Option<PropertyAccessor<D>>); 10] = [
            (props::BINNING, PropertyType::Int, self.binning),
            (props::GAIN, PropertyType::Float, self.gain),
            (props::EM_GAIN, PropertyType::Float, self.em_gain),
            (props::OFFSET, PropertyType::Float, self.offset),
            (
                props::CCD_TEMPERATURE,
                PropertyType::Float,
                self.ccd_temperature,
            ),
            (
                props::CCD_TEMPERATURE_SET_POINT,
                PropertyType::Float,
                self.ccd_temperature_set_point,
            ),
            (props::READOUT_MODE, PropertyType::Enum, self.readout_mode),
            (props::READOUT_TIME, PropertyType::Float, self.readout_time),
            (props::CAMERA_NAME, PropertyType::String, self.camera_name),
            (props::CAMERA_ID, PropertyType::String, self.camera_id),
        ];
        for (name, ty, accessor) in entries {
            if let Some(accessor) = accessor {
                let mut descriptor = PropertyDescriptor::new_boxed(name, ty, accessor.getter);
                if let Some(setter) = accessor.setter {
                    descriptor = descriptor.with_setter_boxed(setter);
                }
                registry.register(descriptor);
            }
        }
    }
}

/// Register the always-present `Exposure` property for a camera.
pub fn register_exposure_property<D: CameraDevice + 'static>(registry: &mut PropertyRegistry<D>) {
    registry.register(
        PropertyDescriptor::new(props::EXPOSURE, PropertyType::Float, |d: &D| {
            Ok(PropertyValue::Float(d.exposure()))
        })
        .with_setter(|d: &mut D, value| match value.as_f64() {
            Some(ms) => d.set_exposure(ms),
            None => Err(CoreError::TypeCoercion {
                value: value.to_string(),
                target: PropertyType::Float.to_string(),
            }),
        }),
    );
}
