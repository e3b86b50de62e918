use super::{Frame, FrameSource, SequenceCounter};
use anyhow::{Context, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    seq: SequenceCounter,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    /// Open a webcam, asking for the format closest to `width`x`height`.
    ///
    /// Failure here is fatal to the session; there is no retry.
    pub fn new(device_index: u32, width: u32, height: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}",
            device_index,
            width,
            height
        );

        let index = CameraIndex::Index(device_index);
        let wanted = CameraFormat::new(Resolution::new(width, height), FrameFormat::YUYV, 30);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let actual = camera.resolution();
        tracing::info!(
            "Webcam streaming at {}x{}",
            actual.width(),
            actual.height()
        );

        Ok(Self {
            camera,
            seq: SequenceCounter::default(),
            width: actual.width(),
            height: actual.height(),
        })
    }
}

impl FrameSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<Frame> {
        let buffer = self.camera.frame().context("Failed to capture frame")?;

        let decoded = buffer
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        Ok(Frame::new(self.seq.next(), decoded))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
