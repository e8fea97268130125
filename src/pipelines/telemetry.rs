// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline counters and event bus
//!
//! Every stage reports here. Counters feed [`PipelineStats`]; notable
//! occurrences are also broadcast as [`PipelineEvent`]s to whoever
//! subscribed (CLI output, an outer API layer, tests). Slow subscribers
//! lose events rather than slowing the pipeline.

use crate::constants::timing::{EVENT_BUS_CAPACITY, RECENT_FAILURE_WINDOW};
use crate::errors::{CaptureFailure, SubmitError};
use crate::pipelines::alert::SuppressReason;
use crate::pipelines::health::SystemHealth;
use crate::pipelines::types::EventId;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

/// How the orchestrator resolved one capture event
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// An alert was persisted
    Alerted { alert_id: Uuid, notified: bool },
    /// Analysis found nothing alert-worthy, or the alert was a duplicate
    Suppressed(SuppressReason),
    /// Upload, analysis or persistence failed; the event was discarded
    Failed(CaptureFailure),
    /// Abandoned because the session is stopping
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    SessionStarted {
        camera_id: String,
        source: String,
    },
    SessionStopped {
        camera_id: String,
        fault: Option<String>,
    },
    /// A motion episode closed and was handed to the orchestrator
    EventSubmitted {
        event_id: EventId,
        camera_id: String,
        score: f32,
    },
    /// The orchestrator refused an event (saturation, shutdown)
    EventRejected {
        event_id: EventId,
        reason: SubmitError,
    },
    EventCompleted {
        event_id: EventId,
        camera_id: String,
        outcome: EventOutcome,
    },
    NotificationFailed {
        alert_id: Uuid,
        error: String,
    },
    /// Periodic host resource sample
    HealthReport(SystemHealth),
}

/// Snapshot of pipeline counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub frames_sampled: u64,
    pub motion_frames: u64,
    pub source_errors: u64,
    pub events_submitted: u64,
    pub events_rejected: u64,
    pub alerts: u64,
    pub suppressed: u64,
    pub failures: u64,
    pub cancelled: u64,
    pub notification_failures: u64,
    /// Failures within the last hour
    pub recent_failures: usize,
    pub uptime: Duration,
}

#[derive(Default)]
struct Counters {
    stats: PipelineStats,
    failure_times: VecDeque<Instant>,
    last_health: Option<SystemHealth>,
}

impl Counters {
    /// Forget failures older than the reporting window
    fn prune_failures(&mut self, now: Instant) {
        while self
            .failure_times
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) > RECENT_FAILURE_WINDOW)
        {
            self.failure_times.pop_front();
        }
    }
}

pub struct Telemetry {
    counters: Mutex<Counters>,
    events: broadcast::Sender<PipelineEvent>,
    started: Mutex<Option<Instant>>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            counters: Mutex::new(Counters::default()),
            events,
            started: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Start the uptime clock
    pub fn mark_started(&self) {
        *self.started.lock().unwrap() = Some(Instant::now());
    }

    /// Stop the uptime clock
    pub fn mark_stopped(&self) {
        *self.started.lock().unwrap() = None;
    }

    /// Count a sampled frame (not broadcast)
    pub fn frame_sampled(&self, motion: bool) {
        let mut counters = self.counters.lock().unwrap();
        counters.stats.frames_sampled += 1;
        if motion {
            counters.stats.motion_frames += 1;
        }
    }

    /// Count a failed grab (not broadcast)
    pub fn source_error(&self) {
        self.counters.lock().unwrap().stats.source_errors += 1;
    }

    /// Update counters for `event` and broadcast it
    pub fn record(&self, event: PipelineEvent) {
        {
            let mut counters = self.counters.lock().unwrap();
            match &event {
                PipelineEvent::EventSubmitted { .. } => counters.stats.events_submitted += 1,
                PipelineEvent::EventRejected { .. } => counters.stats.events_rejected += 1,
                PipelineEvent::EventCompleted { outcome, .. } => match outcome {
                    EventOutcome::Alerted { .. } => counters.stats.alerts += 1,
                    EventOutcome::Suppressed(_) => counters.stats.suppressed += 1,
                    EventOutcome::Failed(_) => {
                        let now = Instant::now();
                        counters.stats.failures += 1;
                        counters.prune_failures(now);
                        counters.failure_times.push_back(now);
                    }
                    EventOutcome::Cancelled => counters.stats.cancelled += 1,
                },
                PipelineEvent::NotificationFailed { .. } => {
                    counters.stats.notification_failures += 1
                }
                PipelineEvent::HealthReport(health) => {
                    counters.last_health = Some(health.clone())
                }
                PipelineEvent::SessionStarted { .. } | PipelineEvent::SessionStopped { .. } => {}
            }
        }

        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn stats(&self) -> PipelineStats {
        let mut counters = self.counters.lock().unwrap();
        counters.prune_failures(Instant::now());

        let mut stats = counters.stats.clone();
        stats.recent_failures = counters.failure_times.len();
        stats.uptime = self
            .started
            .lock()
            .unwrap()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        stats
    }

    /// Most recent health report, if the reporter has run
    pub fn last_health(&self) -> Option<SystemHealth> {
        self.counters.lock().unwrap().last_health.clone()
    }
}
