//! Integration tests for camera devices through the core facade:
//! acquisition contract validation, ROI handling, and lazy sequences.

use unicore::device::camera::SequenceHandle;
use unicore::device::demo::{DemoCamera, VecBufferProvider};
use unicore::{
    AcquisitionSupport, BufferProvider, CameraDevice, CoreError, CoreResult, Device, FrameMetadata,
    PixelBuffer, PixelType, SoftwareDevice, UniCore,
};

fn core_with_camera(shape: (usize, usize)) -> UniCore {
    let mut core = UniCore::new();
    core.load_device(
        "Cam",
        SoftwareDevice::Camera(Box::new(DemoCamera::new("Cam", shape, PixelType::U16))),
    )
    .unwrap();
    core.initialize_all_devices().unwrap();
    core
}

#[test]
fn snap_fills_a_full_sensor_buffer() {
    let mut core = core_with_camera((8, 12));
    let (buffer, metadata) = core.snap_image("Cam").unwrap();
    assert_eq!(buffer.shape(), (8, 12));
    assert_eq!(buffer.dtype(), PixelType::U16);
    assert_eq!(buffer.as_bytes().len(), 8 * 12 * 2);
    assert_eq!(metadata.tag("Camera"), Some(&serde_json::json!("Cam")));
}

#[test]
fn roi_constrains_the_snap_shape() {
    let mut core = core_with_camera((16, 16));
    core.set_roi("Cam", 4, 2, 8, 10).unwrap();
    assert_eq!(
        core.get_roi("Cam").unwrap().map(|r| (r.x, r.y, r.width, r.height)),
        Some((4, 2, 8, 10))
    );
    let (buffer, _) = core.snap_image("Cam").unwrap();
    assert_eq!(buffer.shape(), (10, 8));

    core.clear_roi("Cam").unwrap();
    let (buffer, _) = core.snap_image("Cam").unwrap();
    assert_eq!(buffer.shape(), (16, 16));
}

#[test]
fn snap_crops_the_sensor_window_under_a_roi() {
    let mut core = UniCore::new();
    core.load_device(
        "Cam",
        SoftwareDevice::Camera(Box::new(DemoCamera::new("Cam", (8, 8), PixelType::U8))),
    )
    .unwrap();
    core.initialize_all_devices().unwrap();

    core.set_roi("Cam", 2, 1, 4, 3).unwrap();
    let (buffer, _) = core.snap_image("Cam").unwrap();
    // Rows 1..=3, columns 2..=5 of the 8x8 gradient, not the first 12
    // pixels of the sensor.
    assert_eq!(
        buffer.as_bytes(),
        &[10, 11, 12, 13, 18, 19, 20, 21, 26, 27, 28, 29]
    );
}

#[test]
fn out_of_bounds_roi_is_rejected_and_previous_roi_kept() {
    let mut core = core_with_camera((16, 16));
    core.set_roi("Cam", 0, 0, 8, 8).unwrap();
    let err = core.set_roi("Cam", 10, 10, 8, 8).unwrap_err();
    assert!(matches!(err, CoreError::InvalidRoi { .. }));
    assert!(err.to_string().contains("16x16"));
    // The earlier ROI survives the failed set.
    assert_eq!(
        core.get_roi("Cam").unwrap().map(|r| (r.width, r.height)),
        Some((8, 8))
    );
}

#[test]
fn camera_with_neither_acquisition_path_fails_initialize() {
    let mut core = UniCore::new();
    core.load_device(
        "Broken",
        SoftwareDevice::Camera(Box::new(
            DemoCamera::new("Broken", (8, 8), PixelType::U8)
                .declare_support(AcquisitionSupport::Neither),
        )),
    )
    .unwrap();
    let err = core.initialize_all_devices().unwrap_err();
    assert!(matches!(err, CoreError::ContractViolation { .. }));
    assert!(err.to_string().contains("Broken"));
}

#[test]
fn snap_only_camera_still_serves_sequences() {
    // The default start_sequence reduces to repeated snaps.
    let mut camera = DemoCamera::new("Cam", (4, 4), PixelType::U8);
    let mut provider = VecBufferProvider::default();
    {
        let sequence = camera.start_sequence(Some(3), &mut provider).unwrap();
        let frames: Vec<CoreResult<FrameMetadata>> = sequence.collect();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.is_ok()));
    }
    assert_eq!(provider.frames().len(), 3);
    assert!(provider
        .frames()
        .iter()
        .all(|frame| frame.shape() == (4, 4)));
}

#[test]
fn sequences_are_pull_driven() {
    let mut camera = DemoCamera::new("Cam", (4, 4), PixelType::U8);
    let mut provider = VecBufferProvider::default();
    {
        // Indefinite sequence: nothing is acquired until the consumer pulls.
        let mut sequence = camera.start_sequence(None, &mut provider).unwrap();
        sequence.next().unwrap().unwrap();
        sequence.next().unwrap().unwrap();
        // Dropping the iterator stops acquisition.
    }
    assert_eq!(provider.frames().len(), 2);
}

#[test]
fn roi_sequences_deliver_region_shaped_frames() {
    let mut camera = DemoCamera::new("Cam", (8, 8), PixelType::U8);
    camera.set_roi(2, 2, 3, 4).unwrap();
    let mut provider = VecBufferProvider::default();
    {
        let sequence = camera.start_sequence(Some(2), &mut provider).unwrap();
        assert_eq!(sequence.count(), 2);
    }
    for frame in provider.frames() {
        assert_eq!(frame.shape(), (4, 3));
    }
    // First pixel of the cropped frame is sensor pixel (2, 2).
    assert_eq!(provider.frames()[0].as_bytes()[0], 2 * 8 + 2);
}

#[test]
fn custom_sequence_implementations_are_used_verbatim() {
    // A camera that overrides start_sequence entirely.
    struct StreamingCamera {
        shape: (usize, usize),
    }

    impl Device for StreamingCamera {
        fn name(&self) -> &str {
            "Streamer"
        }
        fn property_names(&self) -> Vec<String> {
            Vec::new()
        }
        fn property_info(&self, property: &str) -> CoreResult<unicore::PropertyInfo> {
            Err(CoreError::PropertyNotFound {
                device: "Streamer".to_string(),
                property: property.to_string(),
            })
        }
        fn get_property(&self, property: &str) -> CoreResult<unicore::PropertyValue> {
            Err(CoreError::PropertyNotFound {
                device: "Streamer".to_string(),
                property: property.to_string(),
            })
        }
        fn set_property(
            &mut self,
            property: &str,
            _value: unicore::PropertyValue,
        ) -> CoreResult<()> {
            Err(CoreError::PropertyNotFound {
                device: "Streamer".to_string(),
                property: property.to_string(),
            })
        }
    }

    impl CameraDevice for StreamingCamera {
        fn sensor_shape(&self) -> (usize, usize) {
            self.shape
        }
        fn dtype(&self) -> PixelType {
            PixelType::U8
        }
        fn exposure(&self) -> f64 {
            1.0
        }
        fn set_exposure(&mut self, _exposure_ms: f64) -> CoreResult<()> {
            Ok(())
        }
        fn acquisition_support(&self) -> AcquisitionSupport {
            AcquisitionSupport::Sequence
        }
        fn roi(&self) -> Option<unicore::Roi> {
            None
        }
        fn store_roi(&mut self, _roi: Option<unicore::Roi>) {}
        fn start_sequence<'a>(
            &'a mut self,
            n_frames: Option<usize>,
            provider: &'a mut dyn BufferProvider,
        ) -> CoreResult<SequenceHandle<'a>> {
            let shape = self.shape;
            let n = n_frames.unwrap_or(0);
            let mut produced = 0;
            Ok(Box::new(std::iter::from_fn(move || {
                if produced >= n {
                    return None;
                }
                produced += 1;
                let buffer: &mut PixelBuffer = provider.acquire(shape, PixelType::U8);
                buffer.as_bytes_mut().fill(produced as u8);
                Some(Ok(FrameMetadata::now()))
            })))
        }
    }

    let mut camera = StreamingCamera { shape: (2, 2) };
    let mut provider = VecBufferProvider::default();
    {
        let sequence = camera.start_sequence(Some(2), &mut provider).unwrap();
        assert_eq!(sequence.count(), 2);
    }
    assert_eq!(provider.frames()[0].as_bytes(), &[1, 1, 1, 1]);
    assert_eq!(provider.frames()[1].as_bytes(), &[2, 2, 2, 2]);
}
