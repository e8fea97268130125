// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Motion sensitivity presets
///
/// Shortcuts for `motion_threshold`: the fraction of pixels that must change
/// between two samples before a frame counts as motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionSensitivity {
    /// Only large changes (a person crossing close to the camera)
    Low,
    /// Balanced for a typical doorway or driveway view (default)
    #[default]
    Medium,
    /// Small changes trigger (distant subjects, may pick up foliage)
    High,
}

impl MotionSensitivity {
    /// All presets, least to most sensitive
    pub const ALL: [MotionSensitivity; 3] = [
        MotionSensitivity::Low,
        MotionSensitivity::Medium,
        MotionSensitivity::High,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            MotionSensitivity::Low => "Low",
            MotionSensitivity::Medium => "Medium",
            MotionSensitivity::High => "High",
        }
    }

    /// Changed-pixel fraction that counts as motion
    pub fn motion_threshold(&self) -> f32 {
        match self {
            MotionSensitivity::Low => 0.10,
            MotionSensitivity::Medium => 0.04,
            MotionSensitivity::High => 0.01,
        }
    }

    /// Parse a preset name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.display_name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Security categories recognized out of the box
pub mod categories {
    pub const PERSON: &str = "person";
    pub const VEHICLE: &str = "vehicle";
    pub const WEAPON: &str = "weapon";
    pub const PACKAGE: &str = "package";

    /// Default allow-list
    pub const DEFAULT_ALERT_CATEGORIES: &[&str] = &[PERSON, VEHICLE, WEAPON, PACKAGE];

    /// Vision labels folded into a category (lowercase label, category)
    pub const LABEL_CATEGORIES: &[(&str, &str)] = &[
        ("person", PERSON),
        ("human", PERSON),
        ("face", PERSON),
        ("vehicle", VEHICLE),
        ("car", VEHICLE),
        ("truck", VEHICLE),
        ("motorcycle", VEHICLE),
        ("bicycle", VEHICLE),
        ("weapon", WEAPON),
        ("gun", WEAPON),
        ("knife", WEAPON),
        ("package", PACKAGE),
        ("bag", PACKAGE),
        ("backpack", PACKAGE),
        ("suitcase", PACKAGE),
    ];

    /// Category for a vision label
    ///
    /// Labels outside the table are their own category, so an allow-list can
    /// name any raw label the vision service emits.
    pub fn category_for_label(label: &str) -> String {
        let label = label.trim().to_lowercase();
        LABEL_CATEGORIES
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, category)| category.to_string())
            .unwrap_or(label)
    }
}

/// Default configuration values
///
/// Debounce timings and confidence thresholds are operator decisions; these
/// only seed a fresh config file.
pub mod defaults {
    use super::Duration;

    pub const CAMERA_ID: &str = "camera-0";
    pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(50);
    pub const PIXEL_DELTA_THRESHOLD: u8 = 25;
    pub const ANALYSIS_MAX_DIMENSION: u32 = 320;
    pub const BURST_WINDOW: Duration = Duration::from_secs(10);
    pub const QUIET_DURATION: Duration = Duration::from_secs(2);
    pub const COOLDOWN: Duration = Duration::from_secs(20);
    pub const QUEUE_CAPACITY: usize = 8;
    pub const WORKER_COUNT: usize = 2;
    pub const RETRY_MAX_ATTEMPTS: u32 = 4;
    pub const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(500);
    pub const RETRY_BACKOFF_MAX: Duration = Duration::from_secs(8);
    pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);
    pub const EVENT_DEADLINE: Duration = Duration::from_secs(90);
    pub const MIN_CONFIDENCE: f32 = 0.7;
    pub const DEDUP_WINDOW: Duration = Duration::from_secs(60);
    pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
    pub const RETENTION_DAYS: u32 = 30;
    /// Period of the system health report
    pub const HEALTH_INTERVAL: Duration = Duration::from_secs(60);
}

/// Frame loop timing constants
pub mod timing {
    use super::Duration;

    /// Log frame statistics every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 300;

    /// Pause after a failed grab before trying again
    pub const SOURCE_RETRY_DELAY: Duration = Duration::from_millis(100);

    /// Consecutive failed grabs before the source is considered gone
    pub const MAX_CONSECUTIVE_SOURCE_ERRORS: u32 = 50;

    /// Log every Nth rejected capture event while the queue is saturated
    pub const REJECTION_LOG_INTERVAL: u64 = 50;

    /// Window for the "recent failures" counter
    pub const RECENT_FAILURE_WINDOW: Duration = Duration::from_secs(3600);

    /// Capacity of the pipeline event broadcast channel
    pub const EVENT_BUS_CAPACITY: usize = 256;

    /// Gaussian blur sigma applied before frame differencing
    pub const MOTION_BLUR_SIGMA: f32 = 1.5;
}

/// File format helpers
pub mod file_formats {
    /// Image file extensions the directory source can replay
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }

    /// JPEG quality for uploaded captures and snapshots
    pub const JPEG_QUALITY: u8 = 85;
}
