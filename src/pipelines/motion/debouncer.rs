// SPDX-License-Identifier: GPL-3.0-only

//! Turns per-frame motion signals into discrete capture events
//!
//! ```text
//!          triggered                 quiet >= quiet_duration
//!  Idle ───────────────▶ Armed ──────────────────────────────▶ Cooling
//!   ▲                     │   or open >= burst_window             │
//!   │                     └─ triggered: coalesce, keep best frame │
//!   └──────────────────── cooldown elapsed ◀──────────────────────┘
//! ```
//!
//! Time comes from each frame's `captured_at`, so the state machine is pure
//! and replays identically given the same frames.

use crate::backends::camera::Frame;
use crate::pipelines::types::{CaptureEvent, EventId, FrameRegion, MotionSignal};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebounceSettings {
    /// Longest an episode may stay open under sustained motion
    pub burst_window: Duration,
    /// Motion-free time that closes an episode
    pub quiet_duration: Duration,
    /// Time after a close during which motion is ignored
    pub cooldown: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Armed,
    Cooling,
}

/// The episode currently open
struct Episode {
    event_id: EventId,
    opened_at: Instant,
    opened_sequence: u64,
    last_triggered_at: Instant,
    best_frame: Frame,
    best_score: f32,
    best_region: Option<FrameRegion>,
}

pub struct Debouncer {
    settings: DebounceSettings,
    camera_id: String,
    state: DebounceState,
    episode: Option<Episode>,
    /// End of the current cooldown; `None` while cooling never expires
    cooling_until: Option<Instant>,
}

impl Debouncer {
    pub fn new(camera_id: impl Into<String>, settings: DebounceSettings) -> Self {
        Self {
            settings,
            camera_id: camera_id.into(),
            state: DebounceState::Idle,
            episode: None,
            cooling_until: None,
        }
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// Feed the signal computed for `frame`
    ///
    /// Returns the finished event when this sample closes an episode.
    pub fn observe(&mut self, signal: &MotionSignal, frame: &Frame) -> Option<CaptureEvent> {
        let now = frame.captured_at;

        if self.state == DebounceState::Cooling
            && self.cooling_until.is_some_and(|until| now >= until)
        {
            debug!(camera_id = %self.camera_id, "Cooldown elapsed");
            self.state = DebounceState::Idle;
            self.cooling_until = None;
        }

        match self.state {
            DebounceState::Idle => {
                if signal.triggered {
                    self.open(signal, frame);
                }
                None
            }
            DebounceState::Armed => {
                let episode = self.episode.as_mut()?;

                if signal.triggered {
                    episode.last_triggered_at = now;
                    if signal.score > episode.best_score {
                        episode.best_frame = frame.clone();
                        episode.best_score = signal.score;
                        episode.best_region = signal.region;
                    }
                }

                let quiet_for = now.saturating_duration_since(episode.last_triggered_at);
                let open_for = now.saturating_duration_since(episode.opened_at);
                if quiet_for >= self.settings.quiet_duration
                    || open_for >= self.settings.burst_window
                {
                    self.close(frame)
                } else {
                    None
                }
            }
            DebounceState::Cooling => None,
        }
    }

    /// Discard any open episode and return to Idle
    pub fn reset(&mut self) {
        if let Some(episode) = self.episode.take() {
            debug!(camera_id = %self.camera_id, event_id = %episode.event_id, "Discarding open motion episode");
        }
        self.state = DebounceState::Idle;
        self.cooling_until = None;
    }

    fn open(&mut self, signal: &MotionSignal, frame: &Frame) {
        let event_id = EventId::new();
        debug!(
            camera_id = %self.camera_id,
            event_id = %event_id,
            sequence = frame.sequence,
            score = signal.score,
            "Motion episode opened"
        );
        self.episode = Some(Episode {
            event_id,
            opened_at: frame.captured_at,
            opened_sequence: frame.sequence,
            last_triggered_at: frame.captured_at,
            best_frame: frame.clone(),
            best_score: signal.score,
            best_region: signal.region,
        });
        self.state = DebounceState::Armed;
    }

    fn close(&mut self, frame: &Frame) -> Option<CaptureEvent> {
        let episode = self.episode.take()?;
        let now = frame.captured_at;

        self.state = DebounceState::Cooling;
        self.cooling_until = now.checked_add(self.settings.cooldown);

        debug!(
            camera_id = %self.camera_id,
            event_id = %episode.event_id,
            opened = episode.opened_sequence,
            closed = frame.sequence,
            score = episode.best_score,
            "Motion episode closed"
        );

        Some(CaptureEvent {
            event_id: episode.event_id,
            camera_id: self.camera_id.clone(),
            frame: episode.best_frame,
            trigger_score: episode.best_score,
            region: episode.best_region,
            opened_at: episode.opened_at,
            closed_at: now,
            opened_sequence: episode.opened_sequence,
            closed_sequence: frame.sequence,
        })
    }
}
