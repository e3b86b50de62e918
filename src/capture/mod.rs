mod still;
#[cfg(feature = "camera")]
mod v4l_capture;

pub use still::StillSource;
#[cfg(feature = "camera")]
pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbImage;
use std::sync::Arc;

/// An immutable camera frame tagged with its acquisition sequence number.
///
/// The pixels sit behind an `Arc` so the same frame can be handed to the
/// segmentation worker and the compositor without copying.
#[derive(Clone, Debug)]
pub struct Frame {
    seq: u64,
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self {
            seq,
            image: Arc::new(image),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Hands out monotonically increasing frame numbers.
#[derive(Debug, Default)]
pub struct SequenceCounter(u64);

impl SequenceCounter {
    pub fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

/// Trait for camera capture sources
pub trait FrameSource {
    /// Produce the most recent decoded frame
    fn capture_frame(&mut self) -> Result<Frame>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
