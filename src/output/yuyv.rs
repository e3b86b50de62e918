use image::RgbImage;

/// Convert an RGB frame to packed YUV 4:2:2 (YUYV).
///
/// Each horizontal pixel pair shares averaged chroma. An odd last column is
/// paired with itself.
pub fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
    let (width, height) = rgb_image.dimensions();
    let mut yuyv = Vec::with_capacity((width.div_ceil(2) * 2 * height * 2) as usize);

    for row in rgb_image.rows() {
        let row: Vec<_> = row.collect();
        for pair in row.chunks(2) {
            let first = pair[0];
            let second = pair.get(1).copied().unwrap_or(first);

            let (y1, u1, v1) = rgb_to_yuv(first[0], first[1], first[2]);
            let (y2, u2, v2) = rgb_to_yuv(second[0], second[1], second[2]);

            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            // YUYV format: Y0 U Y1 V
            yuyv.extend_from_slice(&[y1, u, y2, v]);
        }
    }

    yuyv
}

/// Convert RGB to YUV color space
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}
