//! Person-over-background compositing.
//!
//! The layering is fixed:
//!
//! 1. paint the background over the whole surface
//! 2. erase the background wherever the mask says "person"
//!    (destination-out, mask rescaled bilinearly)
//! 3. draw the camera frame behind what is left (destination-over)
//!
//! The filter is a separate presentation step, see [`crate::filter`].

use crate::catalog::{BackgroundLayer, Fill};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Pixel, RgbImage, Rgba, RgbaImage};
use std::borrow::Cow;

/// Pure compositor for a fixed output surface size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Compositor {
    width: u32,
    height: u32,
}

impl Compositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Composite `frame` over `background` using `mask` (255 = person).
    pub fn composite(
        &self,
        frame: &RgbImage,
        mask: &GrayImage,
        background: &BackgroundLayer,
    ) -> RgbImage {
        let plate = self.background_plate(background);
        self.composite_over(frame, mask, &plate)
    }

    /// Pass 1: the background filling the full surface.
    ///
    /// Image backgrounds are aspect-filled. The result only depends on the
    /// layer, so callers may cache it per background.
    pub fn background_plate(&self, background: &BackgroundLayer) -> RgbImage {
        match &background.fill {
            Fill::Color(color) => RgbImage::from_pixel(self.width, self.height, *color),
            Fill::Image(image) => {
                aspect_fill(image.as_ref(), self.width, self.height, FilterType::Triangle)
                    .into_owned()
            }
        }
    }

    /// Passes 2 and 3 over an already painted background plate.
    pub fn composite_over(&self, frame: &RgbImage, mask: &GrayImage, plate: &RgbImage) -> RgbImage {
        let _span = tracing::debug_span!("composite").entered();

        let carved = self.carve(plate, frame.dimensions(), mask);
        let frame = aspect_fill(frame, self.width, self.height, FilterType::Triangle);

        // destination-over: the opaque frame shows through wherever the
        // background was erased
        let mut surface = RgbImage::new(self.width, self.height);
        for ((out, bg), fg) in surface
            .pixels_mut()
            .zip(carved.pixels())
            .zip(frame.pixels())
        {
            let coverage = u16::from(bg[3]);
            for c in 0..3 {
                out[c] = mix(u16::from(bg[c]), u16::from(fg[c]), coverage);
            }
        }
        surface
    }

    /// Pass 2: destination-out. The background keeps `255 - mask` of its
    /// coverage at each pixel.
    ///
    /// The mask is first stretched back onto the frame it was computed from,
    /// then aspect-filled exactly like the frame so the two line up.
    fn carve(&self, plate: &RgbImage, frame_size: (u32, u32), mask: &GrayImage) -> RgbaImage {
        let (fw, fh) = frame_size;
        let on_frame: Cow<'_, GrayImage> = if mask.dimensions() == frame_size {
            Cow::Borrowed(mask)
        } else {
            Cow::Owned(imageops::resize(mask, fw, fh, FilterType::Triangle))
        };
        let mask = aspect_fill(&*on_frame, self.width, self.height, FilterType::Triangle);

        let mut carved = RgbaImage::new(self.width, self.height);
        for ((out, bg), m) in carved
            .pixels_mut()
            .zip(plate.pixels())
            .zip(mask.pixels())
        {
            *out = Rgba([bg[0], bg[1], bg[2], 255 - m[0]]);
        }
        carved
    }
}

/// `bg * coverage + fg * (1 - coverage)` in 8-bit fixed point
fn mix(bg: u16, fg: u16, coverage: u16) -> u8 {
    let v = u32::from(bg) * u32::from(coverage) + u32::from(fg) * u32::from(255 - coverage);
    ((v + 127) / 255) as u8
}

/// Scale `image` to cover `width`x`height` keeping its aspect ratio, then
/// crop the overflow evenly from both sides.
pub fn aspect_fill<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Cow<'_, ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let (iw, ih) = image.dimensions();
    if (iw, ih) == (width, height) {
        return Cow::Borrowed(image);
    }
    if iw == 0 || ih == 0 {
        return Cow::Owned(ImageBuffer::new(width, height));
    }

    let scale = f64::max(
        f64::from(width) / f64::from(iw),
        f64::from(height) / f64::from(ih),
    );
    let sw = ((f64::from(iw) * scale).ceil() as u32).max(width);
    let sh = ((f64::from(ih) * scale).ceil() as u32).max(height);

    let scaled = imageops::resize(image, sw, sh, filter);
    let x = (sw - width) / 2;
    let y = (sh - height) / 2;
    Cow::Owned(imageops::crop_imm(&scaled, x, y, width, height).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use std::sync::Arc;

    fn frame(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 13) as u8, (y * 17) as u8, 200]))
    }

    fn green() -> BackgroundLayer {
        BackgroundLayer::color("green", "Green", Rgb([0, 255, 0]))
    }

    #[test]
    fn opaque_mask_shows_raw_frame() {
        let c = Compositor::new(8, 6);
        let f = frame(8, 6);
        let mask = GrayImage::from_pixel(8, 6, Luma([255]));
        assert_eq!(c.composite(&f, &mask, &green()), f);
    }

    #[test]
    fn transparent_mask_shows_background_only() {
        let c = Compositor::new(8, 6);
        let mask = GrayImage::from_pixel(8, 6, Luma([0]));
        let out = c.composite(&frame(8, 6), &mask, &green());
        assert!(out.pixels().all(|p| *p == Rgb([0, 255, 0])));
    }

    #[test]
    fn small_mask_is_rescaled_to_surface() {
        let c = Compositor::new(8, 6);
        let f = frame(8, 6);
        let mask = GrayImage::from_pixel(2, 2, Luma([255]));
        assert_eq!(c.composite(&f, &mask, &green()), f);
    }

    #[test]
    fn half_mask_blends_evenly() {
        let c = Compositor::new(2, 2);
        let f = RgbImage::from_pixel(2, 2, Rgb([200, 0, 0]));
        let mask = GrayImage::from_pixel(2, 2, Luma([128]));
        let bg = BackgroundLayer::color("b", "B", Rgb([0, 0, 200]));
        let p = *c.composite(&f, &mask, &bg).get_pixel(0, 0);
        assert!(p[0].abs_diff(100) <= 1 && p[2].abs_diff(100) <= 1, "{p:?}");
    }

    #[test]
    fn split_mask_keeps_person_side() {
        let c = Compositor::new(8, 2);
        let f = RgbImage::from_pixel(8, 2, Rgb([255, 255, 255]));
        let mask = GrayImage::from_fn(8, 2, |x, _| Luma([if x < 4 { 255 } else { 0 }]));
        let out = c.composite(&f, &mask, &green());
        assert_eq!(*out.get_pixel(0, 0), Rgb([255, 255, 255]));
        assert_eq!(*out.get_pixel(7, 1), Rgb([0, 255, 0]));
    }

    #[test]
    fn composite_is_deterministic_and_leaves_inputs_alone() {
        let c = Compositor::new(16, 9);
        let f = frame(32, 18);
        let mask = GrayImage::from_fn(7, 5, |x, y| Luma([((x + y) * 20) as u8]));
        let (f0, m0) = (f.clone(), mask.clone());

        let a = c.composite(&f, &mask, &green());
        let b = c.composite(&f, &mask, &green());
        assert_eq!(a, b);
        assert_eq!(f, f0);
        assert_eq!(mask, m0);
    }

    #[test]
    fn image_background_fills_surface() {
        let c = Compositor::new(16, 9);
        let layer = BackgroundLayer {
            id: "tall".to_string(),
            display_name: "Tall".to_string(),
            fill: Fill::Image(Arc::new(RgbImage::from_pixel(3, 10, Rgb([9, 9, 9])))),
        };
        let plate = c.background_plate(&layer);
        assert_eq!(plate.dimensions(), (16, 9));
        assert!(plate.pixels().all(|p| *p == Rgb([9, 9, 9])));
    }

    #[test]
    fn aspect_fill_crops_instead_of_stretching() {
        // Left half red, right half blue; filling a square keeps the middle.
        let wide = RgbImage::from_fn(8, 2, |x, _| {
            if x < 4 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let out = aspect_fill(&wide, 4, 4, FilterType::Triangle);
        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(*out.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(3, 3), Rgb([0, 0, 255]));
    }

    #[test]
    fn frame_of_other_size_still_fills_surface() {
        let c = Compositor::new(16, 9);
        let f = RgbImage::from_pixel(4, 3, Rgb([50, 60, 70]));
        let mask = GrayImage::from_pixel(4, 3, Luma([255]));
        let out = c.composite(&f, &mask, &green());
        assert_eq!(out.dimensions(), (16, 9));
        assert!(out.pixels().all(|p| *p == Rgb([50, 60, 70])));
    }
}
