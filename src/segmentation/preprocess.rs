use image::{imageops, GrayImage, Luma, RgbImage};
use ndarray::{Array4, ArrayViewD};

/// Converts frames into model input tensors and model output back into masks
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// The frame is resized to the model input size with a triangle filter,
    /// scaled to [0, 1] and laid out as `[1, 3, height, width]`.
    pub fn to_tensor(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() != (self.target_width, self.target_height) {
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            image
        };

        let (width, height) = source.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in source.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                tensor[[0, channel, y, x]] = pixel[channel] as f32 / 255.0;
            }
        }

        tensor
    }

    /// Turn an alpha output of shape `[1, 1, H, W]` (values 0.0-1.0) into a
    /// mask image at model resolution. Rescaling is left to the compositor.
    pub fn to_mask(alpha: &ArrayViewD<'_, f32>) -> Option<GrayImage> {
        let shape = alpha.shape();
        if shape.len() != 4 {
            return None;
        }
        let (height, width) = (shape[2], shape[3]);

        Some(GrayImage::from_fn(width as u32, height as u32, |x, y| {
            let value = alpha[[0, 0, y as usize, x as usize]];
            Luma([(value * 255.0).round().clamp(0.0, 255.0) as u8])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn tensor_is_nchw_and_normalized() {
        let pre = Preprocessor::new(2, 2);
        let image = RgbImage::from_pixel(2, 2, image::Rgb([255, 0, 51]));
        let tensor = pre.to_tensor(&image);

        assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
        assert_eq!(tensor[[0, 0, 1, 1]], 1.0);
        assert_eq!(tensor[[0, 1, 0, 0]], 0.0);
        assert!((tensor[[0, 2, 0, 1]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn alpha_becomes_gray_mask() {
        let mut alpha = Array4::<f32>::zeros((1, 1, 2, 3));
        alpha[[0, 0, 1, 2]] = 1.0;
        let mask = Preprocessor::to_mask(&alpha.view().into_dyn()).unwrap();

        assert_eq!(mask.dimensions(), (3, 2));
        assert_eq!(mask.get_pixel(2, 1)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
    }
}
