// SPDX-License-Identifier: GPL-3.0-only

//! Capture orchestrator
//!
//! Bounded intake plus a fixed worker pool. Each worker takes one capture
//! event at a time through upload, analysis and the alert decision:
//!
//! ```text
//! submit() ──▶ [ bounded queue ] ──▶ worker 1 ─┐
//!    │                           ──▶ worker 2 ─┼─▶ upload ─▶ analyze ─▶ AlertDecider
//!    ▼                           ──▶ worker N ─┘   (retry)    (retry)
//! QueueFull when queued + in flight == capacity + workers
//! ```
//!
//! Admission is counted rather than left to channel timing: an event is only
//! accepted while fewer than `queue_capacity + worker_count` events are
//! outstanding, so a burst of submissions is rejected at the same point
//! every time.

pub mod retry;

pub use retry::{CancelToken, RetryError, RetryPolicy};

use crate::backends::analysis::AnalysisGateway;
use crate::backends::upload::UploadGateway;
use crate::errors::{CaptureFailure, SubmitError};
use crate::pipelines::alert::{AlertDecider, Decision};
use crate::pipelines::telemetry::{EventOutcome, PipelineEvent, Telemetry};
use crate::pipelines::types::{AlertCandidate, CaptureEvent, EventId};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Grace period for cancelled workers before they are aborted
const CANCEL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    /// Events waiting for a worker
    pub queue_capacity: usize,
    /// Concurrent upload + analysis tasks
    pub worker_count: usize,
    /// Hard limit for upload + analysis of one event
    pub event_deadline: Duration,
    pub retry: RetryPolicy,
}

/// How `shutdown` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All outstanding events finished within the drain timeout
    pub drained: bool,
    /// Events that were aborted without reporting an outcome
    pub abandoned: usize,
}

/// Collaborators a worker needs for one event
struct WorkerContext {
    upload: Arc<dyn UploadGateway>,
    analysis: Arc<dyn AnalysisGateway>,
    decider: Arc<AlertDecider>,
    telemetry: Arc<Telemetry>,
    outstanding: Arc<Mutex<HashSet<EventId>>>,
    settings: OrchestratorSettings,
}

pub struct CaptureOrchestrator {
    sender: Mutex<Option<mpsc::Sender<CaptureEvent>>>,
    outstanding: Arc<Mutex<HashSet<EventId>>>,
    capacity: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: watch::Sender<bool>,
}

impl CaptureOrchestrator {
    /// Spawn the worker pool
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        settings: OrchestratorSettings,
        upload: Arc<dyn UploadGateway>,
        analysis: Arc<dyn AnalysisGateway>,
        decider: Arc<AlertDecider>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let worker_count = settings.worker_count.max(1);
        let capacity = settings.queue_capacity + worker_count;

        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let (cancel, cancel_rx) = watch::channel(false);
        let outstanding = Arc::new(Mutex::new(HashSet::new()));

        let context = Arc::new(WorkerContext {
            upload,
            analysis,
            decider,
            telemetry,
            outstanding: Arc::clone(&outstanding),
            settings,
        });

        let workers = (0..worker_count)
            .map(|index| {
                let context = Arc::clone(&context);
                let receiver = Arc::clone(&receiver);
                let cancel = CancelToken::new(cancel_rx.clone());
                tokio::spawn(worker_loop(index, context, receiver, cancel))
            })
            .collect();

        info!(
            workers = worker_count,
            queue_capacity = settings.queue_capacity,
            "Capture orchestrator started"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            outstanding,
            capacity,
            workers: Mutex::new(workers),
            cancel,
        }
    }

    /// Hand an event to the worker pool without blocking
    ///
    /// The caller drops the event on `QueueFull`; that is the shedding policy,
    /// not an error condition.
    pub fn submit(&self, event: CaptureEvent) -> Result<(), SubmitError> {
        let sender = self.sender.lock().unwrap();
        let Some(sender) = sender.as_ref() else {
            return Err(SubmitError::Closed);
        };

        let event_id = event.event_id;
        let mut outstanding = self.outstanding.lock().unwrap();
        if outstanding.contains(&event_id) {
            return Err(SubmitError::Duplicate);
        }
        if outstanding.len() >= self.capacity {
            return Err(SubmitError::QueueFull);
        }

        match sender.try_send(event) {
            Ok(()) => {
                outstanding.insert(event_id);
                debug!(event_id = %event_id, outstanding = outstanding.len(), "Event queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(SubmitError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SubmitError::Closed),
        }
    }

    /// Events queued or in flight
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().unwrap().len()
    }

    /// Maximum outstanding events (`queue_capacity + worker_count`)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop accepting events; queued ones are still processed
    pub fn close(&self) {
        if self.sender.lock().unwrap().take().is_some() {
            debug!("Capture intake closed");
        }
    }

    /// Close intake and let workers drain for up to `drain_timeout`
    ///
    /// Whatever is still running afterwards is cancelled: network calls are
    /// abandoned and the events report `Cancelled`. Workers that do not react
    /// within a short grace period are aborted.
    pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
        self.close();

        let handles = std::mem::take(&mut *self.workers.lock().unwrap());
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let mut all_done = std::pin::pin!(futures::future::join_all(handles));

        let drained = tokio::time::timeout(drain_timeout, all_done.as_mut())
            .await
            .is_ok();

        if !drained {
            warn!(
                outstanding = self.outstanding(),
                timeout_ms = drain_timeout.as_millis() as u64,
                "Drain timeout reached, cancelling in-flight events"
            );
            let _ = self.cancel.send(true);

            if tokio::time::timeout(CANCEL_GRACE, all_done.as_mut())
                .await
                .is_err()
            {
                warn!("Workers ignored cancellation, aborting");
                for abort in &aborts {
                    abort.abort();
                }
            }
        }

        let abandoned = {
            let mut outstanding = self.outstanding.lock().unwrap();
            let count = outstanding.len();
            outstanding.clear();
            count
        };

        info!(drained, abandoned, "Capture orchestrator stopped");
        ShutdownReport { drained, abandoned }
    }
}

impl Drop for CaptureOrchestrator {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
        for handle in self.workers.lock().unwrap().iter() {
            handle.abort();
        }
    }
}

async fn worker_loop(
    index: usize,
    context: Arc<WorkerContext>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<CaptureEvent>>>,
    mut cancel: CancelToken,
) {
    debug!(worker = index, "Capture worker started");

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(event) = next else {
            break;
        };

        let event_id = event.event_id;
        let camera_id = event.camera_id.clone();
        let outcome = process_event(&context, event, &mut cancel).await;

        match &outcome {
            EventOutcome::Failed(failure) => {
                warn!(worker = index, event_id = %event_id, error = %failure, "CaptureFailed")
            }
            other => debug!(worker = index, event_id = %event_id, outcome = ?other, "Event resolved"),
        }

        context.outstanding.lock().unwrap().remove(&event_id);
        context.telemetry.record(PipelineEvent::EventCompleted {
            event_id,
            camera_id,
            outcome,
        });
    }

    debug!(worker = index, "Capture worker exiting");
}

/// Upload, analyze and decide one event
async fn process_event(
    context: &WorkerContext,
    event: CaptureEvent,
    cancel: &mut CancelToken,
) -> EventOutcome {
    let retry = context.settings.retry;
    let event_id = event.event_id;

    let analyzed = tokio::time::timeout(context.settings.event_deadline, async {
        let image_ref = retry
            .run("upload", cancel, |_| context.upload.upload(event_id, &event.frame))
            .await
            .map_err(|e| e.into_gateway_error().map(CaptureFailure::Upload))?;

        let labels = retry
            .run("analysis", cancel, |_| context.analysis.analyze(&image_ref))
            .await
            .map_err(|e| e.into_gateway_error().map(CaptureFailure::Analysis))?;

        Ok::<_, Option<CaptureFailure>>((image_ref, labels))
    })
    .await;

    let (remote_image_ref, detected_labels) = match analyzed {
        Ok(Ok(result)) => result,
        Ok(Err(Some(failure))) => return EventOutcome::Failed(failure),
        Ok(Err(None)) => return EventOutcome::Cancelled,
        Err(_) => return EventOutcome::Failed(CaptureFailure::Deadline),
    };

    let candidate = AlertCandidate {
        event_id,
        camera_id: event.camera_id,
        remote_image_ref,
        detected_labels,
        analyzed_at: Utc::now(),
    };

    match context.decider.decide(candidate).await {
        Ok(Decision::Alerted { alert, notified }) => EventOutcome::Alerted {
            alert_id: alert.alert_id,
            notified,
        },
        Ok(Decision::Suppressed(reason)) => EventOutcome::Suppressed(reason),
        Err(e) => EventOutcome::Failed(CaptureFailure::Storage(e)),
    }
}
