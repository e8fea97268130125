// SPDX-License-Identifier: MPL-2.0

//! Alert persistence
//!
//! The pipeline only needs a small contract from storage: idempotent insert
//! keyed by `event_id`, recent-alert queries for analytics, retention purge,
//! and a one-way `notified` flag. Both stores share [`AlertLog`] for the
//! bookkeeping and differ only in whether it reaches disk.

pub mod json_store;
pub mod memory;

pub use json_store::JsonAlertStore;
pub use memory::MemoryAlertStore;

use crate::errors::{StorageError, StorageResult};
use crate::pipelines::types::{Alert, EventId};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

/// Result of an idempotent insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The alert was written
    Inserted(Alert),
    /// An alert for this event already exists; nothing was written
    Duplicate,
}

/// Durable alert storage
pub trait PersistenceGateway: Send + Sync {
    /// Write an alert unless one already exists for its `event_id`
    fn insert_alert<'a>(&'a self, alert: Alert) -> BoxFuture<'a, StorageResult<InsertOutcome>>;

    /// Most recent alerts first, optionally restricted to one category
    fn query_recent<'a>(
        &'a self,
        limit: usize,
        category: Option<&'a str>,
    ) -> BoxFuture<'a, StorageResult<Vec<Alert>>>;

    /// Delete alerts older than `age`, returning how many were removed
    fn purge_older_than<'a>(&'a self, age: Duration) -> BoxFuture<'a, StorageResult<usize>>;

    /// Set `notified` on an alert
    ///
    /// Returns `true` when the flag flipped, `false` if it was already set.
    fn mark_notified<'a>(&'a self, alert_id: Uuid) -> BoxFuture<'a, StorageResult<bool>>;
}

/// In-memory alert bookkeeping shared by the stores
#[derive(Debug, Clone, Default)]
pub struct AlertLog {
    alerts: Vec<Alert>,
    events: HashSet<EventId>,
}

impl AlertLog {
    pub fn from_alerts(alerts: impl IntoIterator<Item = Alert>) -> Self {
        let mut log = Self::default();
        for alert in alerts {
            log.insert(alert);
        }
        log
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn contains_event(&self, event_id: &EventId) -> bool {
        self.events.contains(event_id)
    }

    pub fn insert(&mut self, alert: Alert) -> InsertOutcome {
        if !self.events.insert(alert.event_id) {
            return InsertOutcome::Duplicate;
        }
        self.alerts.push(alert.clone());
        InsertOutcome::Inserted(alert)
    }

    pub fn recent(&self, limit: usize, category: Option<&str>) -> Vec<Alert> {
        let mut matching: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|a| category.is_none_or(|c| a.category.eq_ignore_ascii_case(c.trim())))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        matching
    }

    pub fn purge_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.alerts.len();
        self.alerts.retain(|a| a.created_at >= cutoff);
        self.events = self.alerts.iter().map(|a| a.event_id).collect();
        before - self.alerts.len()
    }

    pub fn mark_notified(&mut self, alert_id: Uuid) -> StorageResult<bool> {
        let alert = self
            .alerts
            .iter_mut()
            .find(|a| a.alert_id == alert_id)
            .ok_or_else(|| StorageError::Write(format!("unknown alert {}", alert_id)))?;

        if alert.notified {
            return Ok(false);
        }
        alert.notified = true;
        Ok(true)
    }
}

/// Cutoff timestamp for a retention age
pub fn retention_cutoff(age: Duration) -> DateTime<Utc> {
    let age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_sub_signed(age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn alert(category: &str, created_at: DateTime<Utc>) -> Alert {
        Alert {
            alert_id: Uuid::new_v4(),
            event_id: EventId::new(),
            camera_id: "cam".into(),
            category: category.into(),
            confidence: 0.9,
            image_ref: "file:///tmp/a.jpg".into(),
            labels: Vec::new(),
            created_at,
            notified: false,
        }
    }
}
