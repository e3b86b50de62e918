use super::{Frame, FrameSource, SequenceCounter};
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;

/// Replays a single still image as a live feed.
///
/// Used when no camera is attached, and in tests.
pub struct StillSource {
    image: RgbImage,
    seq: SequenceCounter,
}

impl StillSource {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            seq: SequenceCounter::default(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Using still image {} as frame source", path.display());

        let image = image::open(path)
            .with_context(|| format!("Failed to open still image {}", path.display()))?
            .to_rgb8();

        Ok(Self::new(image))
    }
}

impl FrameSource for StillSource {
    fn capture_frame(&mut self) -> Result<Frame> {
        Ok(Frame::new(self.seq.next(), self.image.clone()))
    }

    fn resolution(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
