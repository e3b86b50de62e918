use super::{rgb_to_yuyv, OutputSink};
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// Virtual camera backed by a v4l2loopback device.
pub struct V4L2Output {
    _device: Device,
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;

        let wanted = Format::new(width, height, FourCC::new(b"YUYV"));
        let actual = Output::set_format(&device, &wanted)
            .context("Failed to set YUYV output format")?;
        if actual.width != width || actual.height != height {
            tracing::warn!(
                "Device negotiated {}x{} instead of {}x{}",
                actual.width,
                actual.height,
                width,
                height
            );
        }

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device ready");

        Ok(Self {
            _device: device,
            file,
            width,
            height,
        })
    }
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let resized;
        let frame = if frame.dimensions() != (self.width, self.height) {
            resized = image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Lanczos3,
            );
            &resized
        } else {
            frame
        };

        self.file
            .write_all(&rgb_to_yuyv(frame))
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
