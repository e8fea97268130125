// SPDX-License-Identifier: GPL-3.0-only
// Shared types for frame sources

//! Frame type and pixel formats shared by all frame sources

use crate::errors::SourceError;
use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use std::sync::Arc;
use std::time::Instant;

/// Result type for frame source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Pixel layout of [`Frame::data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit luma (what V4L2 YUYV capture reduces to)
    Gray8,
    /// Packed 8-bit RGB
    Rgb8,
    /// Packed 8-bit RGBA
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Gray8 => write!(f, "GRAY8"),
            PixelFormat::Rgb8 => write!(f, "RGB"),
            PixelFormat::Rgba8 => write!(f, "RGBA"),
        }
    }
}

/// One sampled camera frame
///
/// Pixel data is immutable and reference counted, so handing a frame from
/// the frame loop to the debouncer and on to a worker never copies pixels.
/// Rows are tightly packed (no stride padding).
#[derive(Clone)]
pub struct Frame {
    /// Position in the session's frame sequence, starting at 0
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
    /// Monotonic capture time, drives debounce timing
    pub captured_at: Instant,
    /// Wall-clock capture time, used for file names and alerts
    pub timestamp: DateTime<Utc>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Frame {
    /// Build a frame captured now
    pub fn new(
        sequence: u64,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            sequence,
            width,
            height,
            format,
            data: data.into(),
            captured_at: Instant::now(),
            timestamp: Utc::now(),
        }
    }

    /// Override the capture instant (replayed sources, tests)
    pub fn with_captured_at(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Wrap a decoded image, keeping luma and RGB as-is and everything else as RGBA
    pub fn from_image(sequence: u64, image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        match image {
            DynamicImage::ImageLuma8(img) => {
                Self::new(sequence, width, height, PixelFormat::Gray8, img.into_raw())
            }
            DynamicImage::ImageRgb8(img) => {
                Self::new(sequence, width, height, PixelFormat::Rgb8, img.into_raw())
            }
            other => Self::new(
                sequence,
                width,
                height,
                PixelFormat::Rgba8,
                other.to_rgba8().into_raw(),
            ),
        }
    }

    /// Number of bytes a tightly packed frame of this size needs
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// View the pixels as an `image` buffer
    ///
    /// Returns `None` when the buffer is shorter than the dimensions require.
    pub fn to_dynamic_image(&self) -> Option<DynamicImage> {
        let expected = self.expected_len();
        if self.data.len() < expected || expected == 0 {
            return None;
        }
        let pixels = self.data[..expected].to_vec();

        match self.format {
            PixelFormat::Gray8 => {
                GrayImage::from_raw(self.width, self.height, pixels).map(DynamicImage::ImageLuma8)
            }
            PixelFormat::Rgb8 => {
                RgbImage::from_raw(self.width, self.height, pixels).map(DynamicImage::ImageRgb8)
            }
            PixelFormat::Rgba8 => {
                RgbaImage::from_raw(self.width, self.height, pixels).map(DynamicImage::ImageRgba8)
            }
        }
    }

    /// Luma plane of the frame
    pub fn to_luma(&self) -> Option<GrayImage> {
        match self.format {
            PixelFormat::Gray8 => {
                let expected = self.expected_len();
                if self.data.len() < expected || expected == 0 {
                    return None;
                }
                GrayImage::from_raw(self.width, self.height, self.data[..expected].to_vec())
            }
            _ => self.to_dynamic_image().map(|img| img.to_luma8()),
        }
    }

    /// Encode the frame as JPEG
    ///
    /// RGBA frames drop their alpha channel first (JPEG has none).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, String> {
        let image = self
            .to_dynamic_image()
            .ok_or_else(|| format!("Frame buffer too small for {}x{}", self.width, self.height))?;

        let image = match image {
            DynamicImage::ImageRgba8(_) => DynamicImage::ImageRgb8(image.to_rgb8()),
            other => other,
        };

        let mut bytes = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality);
        image
            .write_with_encoder(encoder)
            .map_err(|e| format!("JPEG encoding failed: {}", e))?;
        Ok(bytes)
    }
}
