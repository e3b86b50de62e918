use anyhow::Result;
use image::{GrayImage, Luma, RgbImage};

/// Occlusion mask: 255 = person (opaque foreground), 0 = background.
///
/// Carries the sequence number of the frame it was computed from. Its
/// dimensions are whatever the model produced; the compositor rescales.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    seq: u64,
    alpha: GrayImage,
}

impl Mask {
    pub fn new(seq: u64, alpha: GrayImage) -> Self {
        Self { seq, alpha }
    }

    /// All-foreground mask, used until the first real mask arrives.
    pub fn opaque(width: u32, height: u32) -> Self {
        Self::new(0, GrayImage::from_pixel(width, height, Luma([255])))
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn alpha(&self) -> &GrayImage {
        &self.alpha
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.alpha.dimensions()
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends (RVM, MODNet, MediaPipe, etc.)
pub trait SegmentationModel: Send {
    /// Compute a person mask for `frame`, at whatever resolution the model
    /// works in.
    fn segment(&mut self, frame: &RgbImage) -> Result<GrayImage>;

    /// Reset internal state (for models with temporal/recurrent components)
    fn reset_state(&mut self) {}

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}
