// SPDX-License-Identifier: MPL-2.0

//! Motion-triggered capture and alert pipeline
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌───────────┐
//! │ Frame source │──▶│ MotionTracker  │──▶│ Debouncer │
//! └──────────────┘   └────────────────┘   └─────┬─────┘
//!                                               │ CaptureEvent
//!                                               ▼
//!                 ┌──────────────────────────────────────┐
//!                 │ CaptureOrchestrator (bounded, N workers)
//!                 │   upload ─▶ analyze  (retry/backoff)  │
//!                 └──────────────────┬───────────────────┘
//!                                    │ AlertCandidate
//!                                    ▼
//!                 ┌──────────────────────────────────────┐
//!                 │ AlertDecider (per-camera lock)       │
//!                 │   filter ─▶ dedup ─▶ persist ─▶ notify
//!                 └──────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`motion`]: frame differencing and the debounce state machine
//! - [`capture`]: bounded worker pool with retry policy
//! - [`alert`]: category/confidence filter, dedup and notification
//! - [`telemetry`]: counters and the pipeline event bus
//! - [`health`]: periodic host resource report
//! - [`types`]: data handed between stages

pub mod alert;
pub mod capture;
pub mod health;
pub mod motion;
pub mod telemetry;
pub mod types;

pub use health::SystemHealth;
pub use telemetry::{EventOutcome, PipelineEvent, PipelineStats, Telemetry};
pub use types::*;
