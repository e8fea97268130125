// SPDX-License-Identifier: GPL-3.0-only

//! Motion detection
//!
//! Frames are reduced to a small blurred luma image and compared pixel by
//! pixel. The score is the fraction of pixels whose luma moved by more than
//! `pixel_delta_threshold`; motion is reported when the score reaches
//! `motion_threshold`.

pub mod debouncer;

pub use debouncer::{DebounceSettings, DebounceState, Debouncer};

use super::types::{FrameRegion, MotionSignal};
use crate::backends::camera::Frame;
use crate::constants::timing::MOTION_BLUR_SIGMA;
use image::GrayImage;
use image::imageops::{self, FilterType};

/// Motion detector tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSettings {
    /// Changed-pixel fraction that counts as motion (0.0 - 1.0)
    pub motion_threshold: f32,
    /// Luma difference above which a pixel counts as changed
    pub pixel_delta_threshold: u8,
    /// Longest side of the comparison image
    pub max_dimension: u32,
}

/// Stateless frame comparator
#[derive(Debug, Clone)]
pub struct MotionDetector {
    settings: MotionSettings,
}

impl MotionDetector {
    pub fn new(settings: MotionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MotionSettings {
        &self.settings
    }

    /// Compare two frames
    ///
    /// Deterministic and side-effect free. Frames of different sizes (format
    /// change, camera swap) never count as motion.
    pub fn detect(&self, previous: &Frame, current: &Frame) -> MotionSignal {
        match (self.prepare(previous), self.prepare(current)) {
            (Some(prev), Some(cur)) => self.compare(&prev, &cur),
            _ => MotionSignal::none(),
        }
    }

    /// Reduce a frame to the blurred, downscaled luma image used for comparison
    pub fn prepare(&self, frame: &Frame) -> Option<GrayImage> {
        let luma = frame.to_luma()?;
        let (width, height) = luma.dimensions();
        let longest = width.max(height);
        let max_dimension = self.settings.max_dimension.max(1);

        let scaled = if longest > max_dimension {
            let scale = max_dimension as f32 / longest as f32;
            let w = ((width as f32 * scale).round() as u32).max(1);
            let h = ((height as f32 * scale).round() as u32).max(1);
            imageops::resize(&luma, w, h, FilterType::Triangle)
        } else {
            luma
        };

        Some(imageops::blur(&scaled, MOTION_BLUR_SIGMA))
    }

    /// Compare two prepared images
    pub fn compare(&self, previous: &GrayImage, current: &GrayImage) -> MotionSignal {
        if previous.dimensions() != current.dimensions() {
            return MotionSignal::none();
        }
        let (width, height) = current.dimensions();
        let total = width as usize * height as usize;
        if total == 0 {
            return MotionSignal::none();
        }

        let delta = self.settings.pixel_delta_threshold;
        let mut changed = 0usize;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0u32, 0u32);

        for (x, y, pixel) in current.enumerate_pixels() {
            let before = previous.get_pixel(x, y).0[0];
            if pixel.0[0].abs_diff(before) > delta {
                changed += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        let score = changed as f32 / total as f32;
        let region = (changed > 0).then(|| {
            FrameRegion::from_pixels(
                min_x,
                min_y,
                max_x - min_x + 1,
                max_y - min_y + 1,
                width,
                height,
            )
        });

        MotionSignal {
            triggered: changed > 0 && score >= self.settings.motion_threshold,
            score,
            region,
        }
    }
}

/// Detector plus the previous prepared frame of one session
///
/// Feeding frames in arrival order yields one signal per frame; the first
/// frame (and the first after `reset`) has nothing to compare against.
pub struct MotionTracker {
    detector: MotionDetector,
    previous: Option<GrayImage>,
}

impl MotionTracker {
    pub fn new(settings: MotionSettings) -> Self {
        Self {
            detector: MotionDetector::new(settings),
            previous: None,
        }
    }

    pub fn observe(&mut self, frame: &Frame) -> MotionSignal {
        let Some(current) = self.detector.prepare(frame) else {
            return MotionSignal::none();
        };

        let signal = match &self.previous {
            Some(previous) => self.detector.compare(previous, &current),
            None => MotionSignal::none(),
        };
        self.previous = Some(current);
        signal
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
