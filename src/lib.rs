// SPDX-License-Identifier: MPL-2.0

//! Watchpost - motion-triggered capture and alert pipeline
//!
//! A camera frame loop samples frames, scores motion between consecutive
//! frames and debounces bursts of motion into capture events. Each event is
//! uploaded, analyzed by a vision service and turned into at most one alert,
//! which is persisted and sent to a recipient.
//!
//! # Architecture
//!
//! - [`app`]: monitoring session lifecycle and control surface
//! - [`backends`]: frame sources and the external gateways (upload,
//!   analysis, persistence, notification)
//! - [`pipelines`]: motion detection, debouncing, the capture orchestrator
//!   and the alert decider
//! - [`config`]: configuration file and environment overrides
//! - [`storage`]: data directories and capture file layout
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load(None)?;
//! let collaborators = Collaborators::from_config(&config, true).await?;
//! let monitor = Monitor::for_source(config, "dir:/tmp/frames".parse()?, collaborators);
//! monitor.start().await?;
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use app::{Collaborators, Monitor, SessionStatus};
pub use config::Config;
pub use constants::MotionSensitivity;
pub use errors::{AppError, AppResult};
