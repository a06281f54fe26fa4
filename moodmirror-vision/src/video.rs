//! V4L2 webcam capture.
//!
//! The device is opened once and streamed through memory-mapped buffers.
//! Dropping the [`Camera`] tears the stream down and releases the device,
//! so no capture outlives the component that owns it.

use anyhow::{anyhow, Context};
use image::{ImageBuffer, Rgb};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::error::{Error, Result};
use crate::face::Dimensions;

pub type RgbFrame = ImageBuffer<Rgb<u8>, Vec<u8>>;

pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl Camera {
    /// Open `device` (e.g. `/dev/video0`) and start streaming.
    ///
    /// Fails with [`Error::CameraAccess`] when the device is missing,
    /// busy or not permitted.
    pub fn open(device: &str) -> Result<Self> {
        Self::open_device(device).map_err(Error::CameraAccess)
    }

    fn open_device(device: &str) -> anyhow::Result<Self> {
        let dev = Device::with_path(device)
            .with_context(|| format!("opening {device}"))?;
        let mut fmt = dev.format().context("querying format")?;
        // Prefer RGB, fall back to YUYV, otherwise keep whatever the
        // driver reports and decode best-effort.
        for fourcc in [FourCC::new(b"RGB3"), FourCC::new(b"YUYV")] {
            if fmt.fourcc == fourcc {
                break;
            }
            let wanted = Format::new(fmt.width, fmt.height, fourcc);
            fmt = dev.set_format(&wanted).unwrap_or(fmt);
            if fmt.fourcc == fourcc {
                break;
            }
        }
        let stream =
            Stream::with_buffers(&dev, Type::VideoCapture, 4).context("starting stream")?;
        log::info!(
            "camera {}: {}x{} {:?}",
            device,
            fmt.width,
            fmt.height,
            fmt.fourcc
        );
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
        })
    }

    /// Native capture dimensions negotiated with the driver.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Capture one frame and decode it to RGB.
    ///
    /// Read failures are transient ([`Error::Detection`]): the polling
    /// loop logs them and tries again next cycle.
    pub fn frame(&mut self) -> Result<RgbFrame> {
        self.read_frame().map_err(Error::Detection)
    }

    fn read_frame(&mut self) -> anyhow::Result<RgbFrame> {
        let (data, meta) = self.stream.next().context("reading frame")?;
        log::trace!("frame seq={:?} len={}", meta.sequence, data.len());
        let mut rgb = match self.fourcc {
            f if f == FourCC::new(b"RGB3") => data.to_vec(),
            f if f == FourCC::new(b"YUYV") => yuyv_to_rgb(self.width, self.height, data)?,
            f if f == FourCC::new(b"GREY") => grey_to_rgb(self.width, self.height, data)?,
            other => {
                log::warn!("unexpected pixel format {other:?}, passing through raw");
                data.to_vec()
            }
        };
        let expected = (self.width * self.height * 3) as usize;
        if rgb.len() < expected {
            return Err(anyhow!(
                "short frame buffer: got {}, expected {} ({:?})",
                rgb.len(),
                expected,
                self.fourcc
            ));
        }
        rgb.truncate(expected);
        ImageBuffer::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }
}

/// ITU-R BT.601 conversion of packed YUYV macropixels to RGB.
fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(anyhow!("short YUYV buffer"));
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for &y in &[chunk[0], chunk[2]] {
            let y = y as f32;
            out.push(clamp_u8(y + 1.402 * v));
            out.push(clamp_u8(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp_u8(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        return Err(anyhow!("short GREY buffer"));
    }
    let mut out = Vec::with_capacity(expected * 3);
    for &y in &data[..expected] {
        out.extend_from_slice(&[y, y, y]);
    }
    Ok(out)
}

fn clamp_u8(v: f32) -> u8 {
    v.max(0.0).min(255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grey_replicates_channels() {
        let rgb = grey_to_rgb(2, 1, &[10, 200]).unwrap();
        assert_eq!(rgb, vec![10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn yuyv_neutral_chroma_is_grayscale() {
        // u = v = 128 means zero chroma: every pixel keeps its luma.
        let rgb = yuyv_to_rgb(2, 1, &[64, 128, 192, 128]).unwrap();
        assert_eq!(rgb, vec![64, 64, 64, 192, 192, 192]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(yuyv_to_rgb(4, 4, &[0; 8]).is_err());
        assert!(grey_to_rgb(4, 4, &[0; 8]).is_err());
    }
}
