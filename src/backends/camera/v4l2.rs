// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 frame source
//!
//! Opens a capture device directly, prefers MJPG (cheap on USB bandwidth) and
//! falls back to YUYV. Motion detection only needs luma, so YUYV frames are
//! reduced to their Y samples instead of being converted to RGB.

use super::{Frame, FrameSource, PixelFormat, SourceResult};
use crate::errors::SourceError;
use std::time::Instant;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Memory-mapped buffers queued with the driver
const BUFFER_COUNT: u32 = 4;

/// ENODEV: the device was unplugged mid-stream
const ERRNO_NO_DEVICE: i32 = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamFormat {
    Mjpg,
    Yuyv,
}

pub struct V4l2Source {
    device_path: String,
    // Kept alive for the lifetime of the stream
    _device: Device,
    stream: MmapStream<'static>,
    format: StreamFormat,
    width: u32,
    height: u32,
    sequence: u64,
}

impl V4l2Source {
    pub fn open(device_path: &str) -> SourceResult<Self> {
        info!(device_path, "Opening V4L2 capture device");

        let device = Device::with_path(device_path)
            .map_err(|e| SourceError::Fatal(format!("{}: {}", device_path, e)))?;

        let (format, width, height) = negotiate_format(&device, device_path)?;

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| {
                SourceError::Fatal(format!("{}: failed to start streaming: {}", device_path, e))
            })?;

        info!(device_path, width, height, format = ?format, "V4L2 capture stream started");

        Ok(Self {
            device_path: device_path.to_string(),
            _device: device,
            stream,
            format,
            width,
            height,
            sequence: 0,
        })
    }
}

fn negotiate_format(device: &Device, device_path: &str) -> SourceResult<(StreamFormat, u32, u32)> {
    let current = device
        .format()
        .map_err(|e| SourceError::Fatal(format!("{}: failed to query format: {}", device_path, e)))?;

    for (fourcc, stream_format) in [
        (FourCC::new(b"MJPG"), StreamFormat::Mjpg),
        (FourCC::new(b"YUYV"), StreamFormat::Yuyv),
    ] {
        let mut wanted = current.clone();
        wanted.fourcc = fourcc;
        match device.set_format(&wanted) {
            Ok(applied) if applied.fourcc == fourcc => {
                return Ok((stream_format, applied.width, applied.height));
            }
            Ok(applied) => {
                debug!(wanted = ?fourcc, got = ?applied.fourcc, "Device did not accept format");
            }
            Err(e) => {
                debug!(wanted = ?fourcc, error = %e, "Failed to set format");
            }
        }
    }

    Err(SourceError::Fatal(format!(
        "{}: device supports neither MJPG nor YUYV",
        device_path
    )))
}

/// Extract the Y plane from packed YUYV (Y0 U Y1 V)
fn yuyv_to_luma(buf: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
    let pixels = width as usize * height as usize;
    if buf.len() < pixels * 2 {
        return None;
    }
    Some(buf.iter().step_by(2).take(pixels).copied().collect())
}

impl FrameSource for V4l2Source {
    fn next_frame(&mut self) -> SourceResult<Option<Frame>> {
        let captured_at = Instant::now();

        let (buf, _meta) = self.stream.next().map_err(|e| {
            if e.raw_os_error() == Some(ERRNO_NO_DEVICE) {
                SourceError::Fatal(format!("{}: {}", self.device_path, e))
            } else {
                SourceError::Transient(format!("{}: {}", self.device_path, e))
            }
        })?;

        let frame = match self.format {
            StreamFormat::Mjpg => {
                let image = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                    .map_err(|e| SourceError::Transient(format!("corrupt MJPG frame: {}", e)))?;
                Frame::from_image(self.sequence, image)
            }
            StreamFormat::Yuyv => {
                let luma = yuyv_to_luma(buf, self.width, self.height).ok_or_else(|| {
                    warn!(got = buf.len(), width = self.width, height = self.height, "Short YUYV buffer");
                    SourceError::Transient("short YUYV buffer".into())
                })?;
                Frame::new(self.sequence, self.width, self.height, PixelFormat::Gray8, luma)
            }
        }
        .with_captured_at(captured_at);

        self.sequence += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("v4l2 {} ({}x{} {:?})", self.device_path, self.width, self.height, self.format)
    }
}
