// SPDX-License-Identifier: MPL-2.0

//! Process-local alert store for dry runs and tests

use super::{AlertLog, InsertOutcome, PersistenceGateway, retention_cutoff};
use crate::errors::StorageResult;
use crate::pipelines::types::Alert;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryAlertStore {
    log: Mutex<AlertLog>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored alert, in insertion order
    pub async fn snapshot(&self) -> Vec<Alert> {
        self.log.lock().await.alerts().to_vec()
    }
}

impl PersistenceGateway for MemoryAlertStore {
    fn insert_alert<'a>(&'a self, alert: Alert) -> BoxFuture<'a, StorageResult<InsertOutcome>> {
        Box::pin(async move { Ok(self.log.lock().await.insert(alert)) })
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
            let cutoff = retention_cutoff(age);
            Ok(self.log.lock().await.purge_before(cutoff))
        })
    }

    fn mark_notified<'a>(&'a self, alert_id: Uuid) -> BoxFuture<'a, StorageResult<bool>> {
        Box::pin(async move { self.log.lock().await.mark_notified(alert_id) })
    }
}
