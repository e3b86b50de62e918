//! Presentation-time colour filters.
//!
//! A filter is a named preset made of CSS-style colour operations. It is
//! applied to the finished composite only, so switching presets never
//! touches the frame, the mask or the background.

use image::{imageops, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Built-in filter presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterTransform {
    None,
    Punch,
    Cool,
    Sakura,
    Dark,
    Vintage,
    Sepia,
    Warm,
    Cyber,
    Soft,
    Fade,
    Grayscale,
}

/// One step of a preset, in the order it is applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorOp {
    Brightness(f32),
    Contrast(f32),
    Saturate(f32),
    Sepia(f32),
    Grayscale(f32),
    /// Degrees
    HueRotate(f32),
    /// Mix towards a colour by the given amount
    Tint([u8; 3], f32),
    /// Gaussian blur sigma in pixels
    Blur(f32),
}

impl FilterTransform {
    pub fn ops(self) -> &'static [ColorOp] {
        use ColorOp::*;
        match self {
            Self::None => &[],
            Self::Punch => &[Contrast(1.3), Saturate(1.4)],
            Self::Cool => &[
                Brightness(1.08),
                Contrast(0.92),
                Saturate(0.85),
                Tint([90, 160, 255], 0.08),
            ],
            Self::Sakura => &[
                Brightness(1.06),
                Saturate(1.1),
                Tint([255, 182, 193], 0.15),
            ],
            Self::Dark => &[Brightness(0.75), Contrast(1.4), Saturate(0.8)],
            Self::Vintage => &[
                Sepia(0.4),
                Contrast(1.1),
                Brightness(1.05),
                Saturate(0.8),
            ],
            Self::Sepia => &[Sepia(1.0)],
            Self::Warm => &[Sepia(0.25), Saturate(1.3), HueRotate(-10.0)],
            Self::Cyber => &[Contrast(1.2), Saturate(1.6), HueRotate(-40.0)],
            Self::Soft => &[Blur(1.5), Brightness(1.05), Contrast(0.95)],
            Self::Fade => &[Contrast(0.8), Brightness(1.1), Saturate(0.7)],
            Self::Grayscale => &[Grayscale(1.0)],
        }
    }

    /// Apply the preset to a finished composite.
    ///
    /// `None` borrows the input unchanged; everything else returns a new
    /// image. The input is never modified.
    pub fn apply(self, image: &RgbImage) -> Cow<'_, RgbImage> {
        let ops = self.ops();
        if ops.is_empty() {
            return Cow::Borrowed(image);
        }

        let _span = tracing::debug_span!("filter", preset = ?self).entered();
        let mut out = image.clone();
        for op in ops {
            match *op {
                ColorOp::Blur(sigma) => out = imageops::blur(&out, sigma),
                op => {
                    for pixel in out.pixels_mut() {
                        *pixel = op.map(*pixel);
                    }
                }
            }
        }
        Cow::Owned(out)
    }
}

type Matrix = [[f32; 3]; 3];

impl ColorOp {
    fn map(self, pixel: Rgb<u8>) -> Rgb<u8> {
        let c = pixel.0.map(|v| v as f32 / 255.0);
        let out = match self {
            ColorOp::Brightness(a) => c.map(|v| v * a),
            ColorOp::Contrast(a) => c.map(|v| (v - 0.5) * a + 0.5),
            ColorOp::Saturate(s) => apply_matrix(&saturate_matrix(s), c),
            ColorOp::Sepia(a) => apply_matrix(&sepia_matrix(a), c),
            ColorOp::Grayscale(a) => apply_matrix(&grayscale_matrix(a), c),
            ColorOp::HueRotate(deg) => apply_matrix(&hue_rotate_matrix(deg), c),
            ColorOp::Tint(color, amount) => {
                let mut out = c;
                for (v, t) in out.iter_mut().zip(color) {
                    *v += (t as f32 / 255.0 - *v) * amount;
                }
                out
            }
            ColorOp::Blur(_) => c,
        };
        Rgb(out.map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8))
    }
}

fn apply_matrix(m: &Matrix, c: [f32; 3]) -> [f32; 3] {
    std::array::from_fn(|row| m[row][0] * c[0] + m[row][1] * c[1] + m[row][2] * c[2])
}

fn saturate_matrix(s: f32) -> Matrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn sepia_matrix(amount: f32) -> Matrix {
    let k = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k],
        [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k],
        [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k],
    ]
}

fn grayscale_matrix(amount: f32) -> Matrix {
    let k = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k],
    ]
}

fn hue_rotate_matrix(degrees: f32) -> Matrix {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}
