// SPDX-License-Identifier: MPL-2.0

//! JSON-lines alert log on disk
//!
//! One alert per line. Inserts append; `mark_notified` and purges rewrite the
//! file through a temporary sibling that is renamed into place, so a crash
//! mid-write leaves either the old or the new file.

use super::{AlertLog, InsertOutcome, PersistenceGateway, retention_cutoff};
use crate::errors::{StorageError, StorageResult};
use crate::pipelines::types::Alert;
use crate::storage;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct JsonAlertStore {
    path: PathBuf,
    log: Mutex<AlertLog>,
}

impl JsonAlertStore {
    /// Open (or create on first write) the log at `path`
    ///
    /// Lines that do not parse are skipped with a warning rather than making
    /// the whole history unreadable.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();

        let alerts = match tokio::fs::read_to_string(&path).await {
            Ok(text) => parse_lines(&path, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StorageError::Read(format!("{}: {}", path.display(), e))),
        };

        info!(path = %path.display(), count = alerts.len(), "Opened alert log");

        Ok(Self {
            path,
            log: Mutex::new(AlertLog::from_alerts(alerts)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, alert: &Alert) -> StorageResult<()> {
        let mut line = serde_json::to_string(alert).map_err(|e| StorageError::Write(e.to_string()))?;
        line.push('\n');

        storage::ensure_parent_dir(&self.path).await.map_err(|e| self.write_error(e))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.write_error(e))?;
        file.write_all(line.as_bytes()).await.map_err(|e| self.write_error(e))?;
        file.flush().await.map_err(|e| self.write_error(e))?;
        Ok(())
    }

    async fn rewrite(&self, log: &AlertLog) -> StorageResult<()> {
        let mut text = String::new();
        for alert in log.alerts() {
            let line = serde_json::to_string(alert).map_err(|e| StorageError::Write(e.to_string()))?;
            text.push_str(&line);
            text.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        storage::ensure_parent_dir(&self.path).await.map_err(|e| self.write_error(e))?;
        tokio::fs::write(&tmp, text).await.map_err(|e| self.write_error(e))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| self.write_error(e))?;
        Ok(())
    }

    fn write_error(&self, e: std::io::Error) -> StorageError {
        StorageError::Write(format!("{}: {}", self.path.display(), e))
    }
}

fn parse_lines(path: &Path, text: &str) -> Vec<Alert> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<Alert>(line) {
            Ok(alert) => Some(alert),
            Err(e) => {
                warn!(path = %path.display(), line = n + 1, error = %e, "Skipping unreadable alert");
                None
            }
        })
        .collect()
}

impl PersistenceGateway for JsonAlertStore {
    fn insert_alert<'a>(&'a self, alert: Alert) -> BoxFuture<'a, StorageResult<InsertOutcome>> {
        Box::pin(async move {
            let mut log = self.log.lock().await;
            let event_id = alert.event_id;
            if log.contains_event(&event_id) {
                return Ok(InsertOutcome::Duplicate);
            }

            // The log only learns about lines that reached the file
            self.append(&alert).await?;
            let outcome = log.insert(alert);
            if let InsertOutcome::Inserted(ref stored) = outcome {
                debug!(alert_id = %stored.alert_id, event_id = %event_id, "Alert appended");
            }
            Ok(outcome)
        })
    }

    fn query_recent<'a>(
        &'a self,
        limit: usize,
        category: Option<&'a str>,
    ) -> BoxFuture<'a, StorageResult<Vec<Alert>>> {
        Box::pin(async move { Ok(self.log.lock().await.recent(limit, category)) })
    }

    fn purge_older_than<'a>(&'a self, age: Duration) -> BoxFuture<'a, StorageResult<usize>> {
        Box::pin(async move {
            let mut log = self.log.lock().await;
            let mut updated = log.clone();
            let removed = updated.purge_before(retention_cutoff(age));
            if removed > 0 {
                self.rewrite(&updated).await?;
                *log = updated;
                info!(removed, path = %self.path.display(), "Purged old alerts");
            }
            Ok(removed)
        })
    }

    fn mark_notified<'a>(&'a self, alert_id: Uuid) -> BoxFuture<'a, StorageResult<bool>> {
        Box::pin(async move {
            let mut log = self.log.lock().await;
            let mut updated = log.clone();
            let flipped = updated.mark_notified(alert_id)?;
            if flipped {
                self.rewrite(&updated).await?;
                *log = updated;
            }
            Ok(flipped)
        })
    }
}
