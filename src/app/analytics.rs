// SPDX-License-Identifier: GPL-3.0-only

//! Alert history summary

use crate::backends::persistence::PersistenceGateway;
use crate::errors::StorageResult;
use crate::pipelines::types::Alert;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    pub notified: usize,
    /// Share of alerts that reached the recipient (0.0 - 1.0)
    pub notification_rate: f32,
    /// Newest first
    pub recent: Vec<Alert>,
}

impl AnalyticsSummary {
    /// Summarize `alerts` (newest first), keeping `recent_limit` of them
    pub fn from_alerts(alerts: &[Alert], recent_limit: usize) -> Self {
        let mut by_category = BTreeMap::new();
        for alert in alerts {
            *by_category.entry(alert.category.clone()).or_insert(0) += 1;
        }
        let notified = alerts.iter().filter(|a| a.notified).count();
        let notification_rate = if alerts.is_empty() {
            0.0
        } else {
            notified as f32 / alerts.len() as f32
        };

        Self {
            total: alerts.len(),
            by_category,
            notified,
            notification_rate,
            recent: alerts.iter().take(recent_limit).cloned().collect(),
        }
    }
}

/// Summarize every stored alert, optionally for one category
pub async fn summarize(
    persistence: &dyn PersistenceGateway,
    recent_limit: usize,
    category: Option<&str>,
) -> StorageResult<AnalyticsSummary> {
    let alerts = persistence.query_recent(usize::MAX, category).await?;
    Ok(AnalyticsSummary::from_alerts(&alerts, recent_limit))
}
