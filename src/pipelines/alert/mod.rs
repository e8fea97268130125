// SPDX-License-Identifier: GPL-3.0-only

//! Alert decisions
//!
//! Turns analysis results into persisted alerts:
//! 1. keep labels whose category is allowed and confident enough
//! 2. under the camera's lock, drop the candidate if an alert with an
//!    overlapping category was raised within the dedup window, otherwise
//!    persist it (idempotent on `event_id`)
//! 3. after releasing the lock, notify the recipient (best effort)

pub mod message;

use crate::backends::notification::NotificationGateway;
use crate::backends::persistence::{InsertOutcome, PersistenceGateway};
use crate::constants::{categories, defaults};
use crate::errors::StorageResult;
use crate::pipelines::telemetry::{PipelineEvent, Telemetry};
use crate::pipelines::types::{Alert, AlertCandidate, DetectedLabel};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct DeciderSettings {
    /// Allowed categories, lowercase
    pub alert_categories: BTreeSet<String>,
    pub min_confidence: f32,
    pub dedup_window: Duration,
    /// Notification recipient; `None` skips notification
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressReason {
    /// No label passed the category and confidence filter
    NoQualifyingLabel,
    /// An overlapping alert for the camera was raised within the dedup window
    DuplicateWindow { previous: Uuid },
    /// An alert for this event already exists
    DuplicateEvent,
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuppressReason::NoQualifyingLabel => write!(f, "no qualifying label"),
            SuppressReason::DuplicateWindow { previous } => {
                write!(f, "duplicate of alert {}", previous)
            }
            SuppressReason::DuplicateEvent => write!(f, "event already alerted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Alerted { alert: Alert, notified: bool },
    Suppressed(SuppressReason),
}

/// Alerts raised recently for one camera
#[derive(Default)]
struct DedupState {
    recent: VecDeque<RecentAlert>,
}

struct RecentAlert {
    alert_id: Uuid,
    categories: BTreeSet<String>,
    raised_at: Instant,
}

impl DedupState {
    fn prune(&mut self, now: Instant, window: Duration) {
        self.recent
            .retain(|r| now.saturating_duration_since(r.raised_at) < window);
    }

    fn overlapping(&self, categories: &BTreeSet<String>) -> Option<Uuid> {
        self.recent
            .iter()
            .find(|r| !r.categories.is_disjoint(categories))
            .map(|r| r.alert_id)
    }
}

pub struct AlertDecider {
    settings: DeciderSettings,
    persistence: Arc<dyn PersistenceGateway>,
    notifier: Arc<dyn NotificationGateway>,
    telemetry: Arc<Telemetry>,
    notify_timeout: Duration,
    cameras: Mutex<HashMap<String, Arc<tokio::sync::Mutex<DedupState>>>>,
}

impl AlertDecider {
    pub fn new(
        settings: DeciderSettings,
        persistence: Arc<dyn PersistenceGateway>,
        notifier: Arc<dyn NotificationGateway>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            settings,
            persistence,
            notifier,
            telemetry,
            notify_timeout: defaults::ATTEMPT_TIMEOUT,
            cameras: Mutex::new(HashMap::new()),
        }
    }

    /// Bound a single notification attempt
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &DeciderSettings {
        &self.settings
    }

    /// Labels that pass the category and confidence filter, most confident first
    pub fn qualifying_labels(&self, labels: &[DetectedLabel]) -> Vec<(String, DetectedLabel)> {
        let mut qualifying: Vec<(String, DetectedLabel)> = labels
            .iter()
            .filter(|label| label.confidence >= self.settings.min_confidence)
            .map(|label| (categories::category_for_label(&label.name), label.clone()))
            .filter(|(category, _)| self.settings.alert_categories.contains(category))
            .collect();
        qualifying.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));
        qualifying
    }

    /// Decide, persist and notify for one candidate
    ///
    /// A storage error is returned to the caller (the event counts as
    /// failed). Notification failures are logged and reported as
    /// `notified: false`; the alert stays persisted.
    pub async fn decide(&self, candidate: AlertCandidate) -> StorageResult<Decision> {
        let qualifying = self.qualifying_labels(&candidate.detected_labels);
        let Some((category, best)) = qualifying.first().cloned() else {
            debug!(event_id = %candidate.event_id, "No qualifying label, suppressed");
            return Ok(Decision::Suppressed(SuppressReason::NoQualifyingLabel));
        };
        let categories: BTreeSet<String> = qualifying.iter().map(|(c, _)| c.clone()).collect();

        let camera_lock = self.camera_lock(&candidate.camera_id);
        let alert = {
            let mut dedup = camera_lock.lock().await;
            let now = Instant::now();
            dedup.prune(now, self.settings.dedup_window);

            if let Some(previous) = dedup.overlapping(&categories) {
                info!(
                    event_id = %candidate.event_id,
                    camera_id = %candidate.camera_id,
                    previous = %previous,
                    "Duplicate within dedup window, suppressed"
                );
                return Ok(Decision::Suppressed(SuppressReason::DuplicateWindow { previous }));
            }

            let alert = Alert {
                alert_id: Uuid::new_v4(),
                event_id: candidate.event_id,
                camera_id: candidate.camera_id.clone(),
                category,
                confidence: best.confidence,
                image_ref: candidate.remote_image_ref.clone(),
                labels: qualifying.into_iter().map(|(_, label)| label).collect(),
                created_at: candidate.analyzed_at,
                notified: false,
            };

            match self.persistence.insert_alert(alert).await? {
                InsertOutcome::Inserted(alert) => {
                    dedup.recent.push_back(RecentAlert {
                        alert_id: alert.alert_id,
                        categories,
                        raised_at: now,
                    });
                    alert
                }
                InsertOutcome::Duplicate => {
                    debug!(event_id = %candidate.event_id, "Alert already stored for event");
                    return Ok(Decision::Suppressed(SuppressReason::DuplicateEvent));
                }
            }
        };

        info!(
            alert_id = %alert.alert_id,
            event_id = %alert.event_id,
            camera_id = %alert.camera_id,
            category = %alert.category,
            confidence = alert.confidence,
            "Alert raised"
        );

        let notified = self.notify(&alert).await;
        let alert = Alert { notified, ..alert };
        Ok(Decision::Alerted { alert, notified })
    }

    fn camera_lock(&self, camera_id: &str) -> Arc<tokio::sync::Mutex<DedupState>> {
        let mut cameras = self.cameras.lock().unwrap();
        Arc::clone(cameras.entry(camera_id.to_string()).or_default())
    }

    async fn notify(&self, alert: &Alert) -> bool {
        let Some(recipient) = self.settings.recipient.as_deref() else {
            warn!(alert_id = %alert.alert_id, "No recipient configured, notification skipped");
            return false;
        };

        let message = message::compose(alert);
        let error = match tokio::time::timeout(
            self.notify_timeout,
            self.notifier.send(recipient, &message),
        )
        .await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "timed out after {}ms",
                self.notify_timeout.as_millis()
            )),
        };

        if let Some(error) = error {
            warn!(alert_id = %alert.alert_id, error = %error, "Notification failed");
            self.telemetry.record(PipelineEvent::NotificationFailed {
                alert_id: alert.alert_id,
                error,
            });
            return false;
        }

        if let Err(e) = self.persistence.mark_notified(alert.alert_id).await {
            warn!(alert_id = %alert.alert_id, error = %e, "Notification sent but flag not stored");
        }
        info!(alert_id = %alert.alert_id, recipient, "Notification sent");
        true
    }
}
