// SPDX-License-Identifier: GPL-3.0-only

//! Data carried between pipeline stages

use crate::backends::camera::Frame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Opaque unique token identifying one capture event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Region within a frame (normalized coordinates 0.0-1.0)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameRegion {
    /// Left edge (0.0 = left of frame, 1.0 = right of frame)
    pub x: f32,
    /// Top edge (0.0 = top of frame, 1.0 = bottom of frame)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

impl FrameRegion {
    /// Create a frame region from pixel coordinates
    pub fn from_pixels(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        Self {
            x: x as f32 / frame_width as f32,
            y: y as f32 / frame_height as f32,
            width: width as f32 / frame_width as f32,
            height: height as f32 / frame_height as f32,
        }
    }

    /// Fraction of the frame covered by the region
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Result of comparing two frames
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSignal {
    pub triggered: bool,
    /// Fraction of pixels that changed (0.0 - 1.0)
    pub score: f32,
    /// Bounding box of the changed pixels
    pub region: Option<FrameRegion>,
}

impl MotionSignal {
    /// No motion (first frame, mismatched dimensions)
    pub fn none() -> Self {
        Self::default()
    }
}

/// One debounced motion episode, handed to the orchestrator
#[derive(Debug, Clone)]
pub struct CaptureEvent {
    pub event_id: EventId,
    pub camera_id: String,
    /// Highest-scoring frame seen during the episode
    pub frame: Frame,
    /// Score of `frame`
    pub trigger_score: f32,
    pub region: Option<FrameRegion>,
    /// First triggering sample
    pub opened_at: Instant,
    /// Sample that closed the episode
    pub closed_at: Instant,
    pub opened_sequence: u64,
    pub closed_sequence: u64,
}

/// One label reported by the vision service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLabel {
    pub name: String,
    /// 0.0 - 1.0
    pub confidence: f32,
}

impl DetectedLabel {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

/// Analysis result for one uploaded capture
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub event_id: EventId,
    pub camera_id: String,
    pub remote_image_ref: String,
    /// Ordered as returned by the vision service
    pub detected_labels: Vec<DetectedLabel>,
    pub analyzed_at: DateTime<Utc>,
}

/// Durable security finding
///
/// At most one alert exists per `event_id`; `notified` only ever goes from
/// `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: Uuid,
    pub event_id: EventId,
    pub camera_id: String,
    pub category: String,
    pub confidence: f32,
    pub image_ref: String,
    /// Qualifying labels, highest confidence first
    #[serde(default)]
    pub labels: Vec<DetectedLabel>,
    pub created_at: DateTime<Utc>,
    pub notified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_unique() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn test_event_id_serializes_as_plain_uuid() {
        let id = EventId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"') && json.len() == 38);
    }

    #[test]
    fn test_frame_region_from_pixels() {
        let region = FrameRegion::from_pixels(10, 20, 50, 40, 100, 80);
        assert_eq!(region.x, 0.1);
        assert_eq!(region.y, 0.25);
        assert_eq!(region.width, 0.5);
        assert_eq!(region.height, 0.5);
        assert_eq!(region.area(), 0.25);
    }
}
