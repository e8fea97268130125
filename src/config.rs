// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Every tuning value the pipeline consumes lives here. The file is JSON,
//! durations are written as (fractional) seconds, and unknown or missing
//! keys fall back to [`crate::constants::defaults`].

use crate::constants::file_formats::JPEG_QUALITY;
use crate::constants::{MotionSensitivity, categories, defaults};
use crate::errors::{AppError, AppResult};
use crate::pipelines::alert::DeciderSettings;
use crate::pipelines::capture::{OrchestratorSettings, RetryPolicy};
use crate::pipelines::motion::{DebounceSettings, MotionSettings};
use crate::storage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variables that override file values
pub mod env_keys {
    pub const CAMERA_ID: &str = "WATCHPOST_CAMERA_ID";
    pub const RECIPIENT: &str = "WATCHPOST_RECIPIENT";
    pub const ANALYSIS_URL: &str = "WATCHPOST_ANALYSIS_URL";
    pub const WEBHOOK_URL: &str = "WATCHPOST_WEBHOOK_URL";
}

/// Longest duration any setting may hold (one year)
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera identifier, used as the dedup scope and in notifications
    pub camera_id: String,
    /// Time between frame samples
    #[serde(with = "duration_secs")]
    pub sample_interval: Duration,
    /// Changed-pixel fraction that counts as motion (0.0 - 1.0)
    pub motion_threshold: f32,
    /// Per-pixel luma difference that counts as "changed"
    pub pixel_delta_threshold: u8,
    /// Longest side of the downscaled frame used for differencing
    pub analysis_max_dimension: u32,
    /// Longest a single motion episode may stay open
    #[serde(with = "duration_secs")]
    pub burst_window: Duration,
    /// Motion-free time that closes an episode
    #[serde(with = "duration_secs")]
    pub quiet_duration: Duration,
    /// Time after an episode closes during which motion is ignored
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    /// Capture events waiting for a worker
    pub queue_capacity: usize,
    /// Concurrent upload + analysis workers
    pub worker_count: usize,
    /// Attempts per collaborator call, including the first
    pub retry_max_attempts: u32,
    /// Delay after the first failed attempt (doubles each retry)
    #[serde(with = "duration_secs")]
    pub retry_backoff_base: Duration,
    /// Upper bound for the retry delay
    #[serde(with = "duration_secs")]
    pub retry_backoff_max: Duration,
    /// Timeout for a single collaborator call
    #[serde(with = "duration_secs")]
    pub attempt_timeout: Duration,
    /// Hard deadline for one event from dequeue to decision
    #[serde(with = "duration_secs")]
    pub event_deadline: Duration,
    /// Categories that raise alerts
    pub alert_categories: BTreeSet<String>,
    /// Minimum label confidence (0.0 - 1.0)
    pub min_confidence: f32,
    /// Window in which overlapping alerts for one camera are merged
    #[serde(with = "duration_secs")]
    pub dedup_window: Duration,
    /// Time in-flight events get to finish when monitoring stops
    #[serde(with = "duration_secs")]
    pub drain_timeout: Duration,
    /// Notification recipient (None disables notifications)
    pub recipient: Option<String>,
    /// Where uploaded captures are written
    pub capture_dir: PathBuf,
    /// JPEG quality of stored captures and snapshots (1 - 100)
    pub jpeg_quality: u8,
    /// Alert log (JSON lines)
    pub alerts_path: PathBuf,
    /// Vision service endpoint
    pub analysis_url: Option<String>,
    /// Webhook for notifications (None logs notifications instead)
    pub webhook_url: Option<String>,
    /// Alerts and captures older than this are purged on start (0 keeps everything)
    pub retention_days: u32,
    /// Period of the system health report (0 disables it)
    #[serde(with = "duration_secs")]
    pub health_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_id: defaults::CAMERA_ID.to_string(),
            sample_interval: defaults::SAMPLE_INTERVAL,
            motion_threshold: MotionSensitivity::default().motion_threshold(),
            pixel_delta_threshold: defaults::PIXEL_DELTA_THRESHOLD,
            analysis_max_dimension: defaults::ANALYSIS_MAX_DIMENSION,
            burst_window: defaults::BURST_WINDOW,
            quiet_duration: defaults::QUIET_DURATION,
            cooldown: defaults::COOLDOWN,
            queue_capacity: defaults::QUEUE_CAPACITY,
            worker_count: defaults::WORKER_COUNT,
            retry_max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            retry_backoff_base: defaults::RETRY_BACKOFF_BASE,
            retry_backoff_max: defaults::RETRY_BACKOFF_MAX,
            attempt_timeout: defaults::ATTEMPT_TIMEOUT,
            event_deadline: defaults::EVENT_DEADLINE,
            alert_categories: categories::DEFAULT_ALERT_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            min_confidence: defaults::MIN_CONFIDENCE,
            dedup_window: defaults::DEDUP_WINDOW,
            drain_timeout: defaults::DRAIN_TIMEOUT,
            recipient: None,
            capture_dir: storage::default_capture_dir(),
            jpeg_quality: JPEG_QUALITY,
            alerts_path: storage::default_alerts_path(),
            analysis_url: None,
            webhook_url: None,
            retention_days: defaults::RETENTION_DAYS,
            health_interval: defaults::HEALTH_INTERVAL,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location
    ///
    /// A missing file is not an error: the defaults are returned. Environment
    /// overrides are applied and the result is validated.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => storage::default_config_path(),
        };

        let mut config = match path {
            Some(ref p) if p.exists() => {
                info!(path = %p.display(), "Loading configuration");
                let text = std::fs::read_to_string(p)
                    .map_err(|e| AppError::Config(format!("{}: {}", p.display(), e)))?;
                Self::from_json(&text)?
            }
            _ => {
                debug!("No configuration file, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json(text: &str) -> AppResult<Self> {
        serde_json::from_str(text).map_err(|e| AppError::Config(format!("Invalid config: {}", e)))
    }

    /// Write the configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Configuration written");
        Ok(())
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(camera_id) = non_empty(env_keys::CAMERA_ID) {
            self.camera_id = camera_id;
        }
        if let Some(recipient) = non_empty(env_keys::RECIPIENT) {
            self.recipient = Some(recipient);
        }
        if let Some(url) = non_empty(env_keys::ANALYSIS_URL) {
            self.analysis_url = Some(url);
        }
        if let Some(url) = non_empty(env_keys::WEBHOOK_URL) {
            self.webhook_url = Some(url);
        }
    }

    /// Apply a sensitivity preset to `motion_threshold`
    pub fn apply_sensitivity(&mut self, sensitivity: MotionSensitivity) {
        self.motion_threshold = sensitivity.motion_threshold();
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(AppError::Config(msg));

        if !(0.0..=1.0).contains(&self.motion_threshold) {
            return invalid(format!(
                "motion_threshold must be within 0.0..=1.0, got {}",
                self.motion_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return invalid(format!(
                "min_confidence must be within 0.0..=1.0, got {}",
                self.min_confidence
            ));
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1".into());
        }
        if self.worker_count == 0 {
            return invalid("worker_count must be at least 1".into());
        }
        if self.retry_max_attempts == 0 {
            return invalid("retry_max_attempts must be at least 1".into());
        }
        if self.alert_categories.is_empty() {
            return invalid("alert_categories must name at least one category".into());
        }
        if self.sample_interval.is_zero() {
            return invalid("sample_interval must be greater than zero".into());
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return invalid(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            ));
        }
        if self.analysis_max_dimension == 0 {
            return invalid("analysis_max_dimension must be greater than zero".into());
        }
        for (name, value) in self.durations() {
            if value > MAX_DURATION {
                return invalid(format!(
                    "{} must be at most {} seconds, got {}",
                    name,
                    MAX_DURATION.as_secs(),
                    value.as_secs_f64()
                ));
            }
        }
        Ok(())
    }

    fn durations(&self) -> [(&'static str, Duration); 11] {
        [
            ("sample_interval", self.sample_interval),
            ("burst_window", self.burst_window),
            ("quiet_duration", self.quiet_duration),
            ("cooldown", self.cooldown),
            ("retry_backoff_base", self.retry_backoff_base),
            ("retry_backoff_max", self.retry_backoff_max),
            ("attempt_timeout", self.attempt_timeout),
            ("event_deadline", self.event_deadline),
            ("dedup_window", self.dedup_window),
            ("drain_timeout", self.drain_timeout),
            ("health_interval", self.health_interval),
        ]
    }

    pub fn motion_settings(&self) -> MotionSettings {
        MotionSettings {
            motion_threshold: self.motion_threshold,
            pixel_delta_threshold: self.pixel_delta_threshold,
            max_dimension: self.analysis_max_dimension,
        }
    }

    pub fn debounce_settings(&self) -> DebounceSettings {
        DebounceSettings {
            burst_window: self.burst_window,
            quiet_duration: self.quiet_duration,
            cooldown: self.cooldown,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            backoff_base: self.retry_backoff_base,
            backoff_max: self.retry_backoff_max,
            attempt_timeout: self.attempt_timeout,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            queue_capacity: self.queue_capacity,
            worker_count: self.worker_count,
            event_deadline: self.event_deadline,
            retry: self.retry_policy(),
        }
    }

    pub fn decider_settings(&self) -> DeciderSettings {
        DeciderSettings {
            alert_categories: self
                .alert_categories
                .iter()
                .map(|c| c.trim().to_lowercase())
                .collect(),
            min_confidence: self.min_confidence,
            dedup_window: self.dedup_window,
            recipient: self.recipient.clone(),
        }
    }
}

/// Serialize durations as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
