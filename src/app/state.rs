// SPDX-License-Identifier: GPL-3.0-only

//! Session state

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of a monitoring session
///
/// `Stopped → Starting → Running → Stopping → Stopped`. A fatal source
/// fault jumps straight to `Stopped` and records the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl SessionStatus {
    /// Whether the frame loop is (or is about to be) pulling frames
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Starting | SessionStatus::Running)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Stopped => "stopped",
            SessionStatus::Starting => "starting",
            SessionStatus::Running => "running",
            SessionStatus::Stopping => "stopping",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CameraSession {
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Why the last session ended on its own, if it did
    pub fault: Option<String>,
}

impl CameraSession {
    /// Stopped → Starting; returns false if the session is already active
    pub fn begin_start(&mut self) -> bool {
        if self.status != SessionStatus::Stopped {
            return false;
        }
        self.status = SessionStatus::Starting;
        self.fault = None;
        true
    }

    /// Starting → Running; returns false if a fault got there first
    pub fn mark_running(&mut self) -> bool {
        if self.status != SessionStatus::Starting {
            return false;
        }
        self.status = SessionStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Starting/Running → Stopping; returns false if there is nothing to stop
    pub fn begin_stop(&mut self) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = SessionStatus::Stopping;
        true
    }

    pub fn mark_stopped(&mut self) {
        self.status = SessionStatus::Stopped;
        self.started_at = None;
    }

    /// Fatal fault: straight to Stopped with a reason
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.mark_stopped();
        self.fault = Some(reason.into());
    }
}
