// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture orchestrator and alert decider

use chrono::Utc;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use watchpost::backends::analysis::AnalysisGateway;
use watchpost::backends::camera::{Frame, PixelFormat};
use watchpost::backends::notification::{Message, NotificationGateway};
use watchpost::backends::persistence::{InsertOutcome, MemoryAlertStore, PersistenceGateway};
use watchpost::backends::upload::UploadGateway;
use watchpost::errors::{
    CaptureFailure, GatewayError, GatewayResult, StorageError, StorageResult, SubmitError,
};
use watchpost::pipelines::alert::{AlertDecider, DeciderSettings, Decision, SuppressReason};
use watchpost::pipelines::capture::{CaptureOrchestrator, OrchestratorSettings, RetryPolicy};
use watchpost::pipelines::{
    Alert, AlertCandidate, CaptureEvent, DetectedLabel, EventId, EventOutcome, PipelineEvent,
    Telemetry,
};

/// Fails transiently (or permanently) for the first `failures` calls
struct FlakyUpload {
    failures: u32,
    permanent: bool,
    calls: AtomicU32,
}

impl FlakyUpload {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            permanent: false,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl UploadGateway for FlakyUpload {
    fn upload<'a>(&'a self, event_id: EventId, _frame: &'a Frame) -> BoxFuture<'a, GatewayResult<String>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                let msg = format!("upload attempt {} failed", call);
                return Err(if self.permanent {
                    GatewayError::Permanent(msg)
                } else {
                    GatewayError::Transient(msg)
                });
            }
            Ok(format!("mem://captures/{}.jpg", event_id))
        })
    }
}

/// Never finishes
struct StuckUpload;

impl UploadGateway for StuckUpload {
    fn upload<'a>(&'a self, _event_id: EventId, _frame: &'a Frame) -> BoxFuture<'a, GatewayResult<String>> {
        Box::pin(std::future::pending())
    }
}

/// Takes a while, then succeeds
struct SlowUpload(Duration);

impl UploadGateway for SlowUpload {
    fn upload<'a>(&'a self, event_id: EventId, _frame: &'a Frame) -> BoxFuture<'a, GatewayResult<String>> {
        Box::pin(async move {
            tokio::time::sleep(self.0).await;
            Ok(format!("mem://captures/{}.jpg", event_id))
        })
    }
}

/// Fails for the first `failures` calls, then reports a person
struct FlakyAnalysis {
    failures: u32,
    permanent: bool,
    calls: AtomicU32,
}

impl FlakyAnalysis {
    fn new(failures: u32, permanent: bool) -> Self {
        Self {
            failures,
            permanent,
            calls: AtomicU32::new(0),
        }
    }
}

impl AnalysisGateway for FlakyAnalysis {
    fn analyze<'a>(&'a self, _image_ref: &'a str) -> BoxFuture<'a, GatewayResult<Vec<DetectedLabel>>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                let msg = "vision service overloaded".to_string();
                return Err(if self.permanent {
                    GatewayError::Permanent(msg)
                } else {
                    GatewayError::Transient(msg)
                });
            }
            Ok(vec![DetectedLabel::new("person", 0.9)])
        })
    }
}

/// Store whose disk is full
struct BrokenStore;

impl PersistenceGateway for BrokenStore {
    fn insert_alert<'a>(&'a self, _alert: Alert) -> BoxFuture<'a, StorageResult<InsertOutcome>> {
        Box::pin(async { Err(StorageError::Write("no space left on device".into())) })
    }

    fn query_recent<'a>(
        &'a self,
        _limit: usize,
        _category: Option<&'a str>,
    ) -> BoxFuture<'a, StorageResult<Vec<Alert>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn purge_older_than<'a>(&'a self, _age: Duration) -> BoxFuture<'a, StorageResult<usize>> {
        Box::pin(async { Ok(0) })
    }

    fn mark_notified<'a>(&'a self, _alert_id: uuid::Uuid) -> BoxFuture<'a, StorageResult<bool>> {
        Box::pin(async { Ok(false) })
    }
}

struct FixedAnalysis {
    labels: Vec<DetectedLabel>,
    calls: AtomicU32,
}

impl FixedAnalysis {
    fn new(labels: &[(&str, f32)]) -> Self {
        Self {
            labels: labels
                .iter()
                .map(|(name, confidence)| DetectedLabel::new(*name, *confidence))
                .collect(),
            calls: AtomicU32::new(0),
        }
    }
}

impl AnalysisGateway for FixedAnalysis {
    fn analyze<'a>(&'a self, _image_ref: &'a str) -> BoxFuture<'a, GatewayResult<Vec<DetectedLabel>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.labels.clone())
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, Message)>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<(String, Message)> {
        self.sent.lock().unwrap().clone()
    }
}

impl NotificationGateway for RecordingNotifier {
    fn send<'a>(&'a self, recipient: &'a str, message: &'a Message) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if self.fail {
                return Err(GatewayError::Transient("mail relay unavailable".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), message.clone()));
            Ok(())
        })
    }
}

fn decider_settings(categories: &[&str], min_confidence: f32) -> DeciderSettings {
    DeciderSettings {
        alert_categories: categories.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
        min_confidence,
        dedup_window: Duration::from_secs(60),
        recipient: Some("security@example.com".into()),
    }
}

fn orchestrator_settings(queue_capacity: usize, worker_count: usize) -> OrchestratorSettings {
    OrchestratorSettings {
        queue_capacity,
        worker_count,
        event_deadline: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(1),
        },
    }
}

fn capture_event(camera_id: &str) -> CaptureEvent {
    let frame = Frame::new(7, 4, 4, PixelFormat::Gray8, vec![128u8; 16]);
    let now = Instant::now();
    CaptureEvent {
        event_id: EventId::new(),
        camera_id: camera_id.to_string(),
        frame,
        trigger_score: 0.2,
        region: None,
        opened_at: now,
        closed_at: now,
        opened_sequence: 5,
        closed_sequence: 7,
    }
}

fn candidate(camera_id: &str, labels: &[(&str, f32)]) -> AlertCandidate {
    AlertCandidate {
        event_id: EventId::new(),
        camera_id: camera_id.to_string(),
        remote_image_ref: "mem://captures/frame.jpg".into(),
        detected_labels: labels
            .iter()
            .map(|(name, confidence)| DetectedLabel::new(*name, *confidence))
            .collect(),
        analyzed_at: Utc::now(),
    }
}

struct Harness {
    store: Arc<MemoryAlertStore>,
    notifier: Arc<RecordingNotifier>,
    telemetry: Arc<Telemetry>,
    decider: Arc<AlertDecider>,
}

fn harness(settings: DeciderSettings, notifier: RecordingNotifier) -> Harness {
    let store = Arc::new(MemoryAlertStore::new());
    let notifier = Arc::new(notifier);
    let telemetry = Arc::new(Telemetry::new());
    let decider = Arc::new(AlertDecider::new(
        settings,
        Arc::clone(&store) as Arc<dyn PersistenceGateway>,
        Arc::clone(&notifier) as Arc<dyn NotificationGateway>,
        Arc::clone(&telemetry),
    ));
    Harness {
        store,
        notifier,
        telemetry,
        decider,
    }
}

/// Wait for the next completed event
async fn next_outcome(events: &mut broadcast::Receiver<PipelineEvent>) -> EventOutcome {
    let wait = async {
        loop {
            if let Ok(PipelineEvent::EventCompleted { outcome, .. }) = events.recv().await {
                return outcome;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("event did not complete")
}

#[tokio::test]
async fn test_transient_upload_failures_are_retried() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());
    let upload = Arc::new(FlakyUpload::new(2));
    let analysis = Arc::new(FixedAnalysis::new(&[("person", 0.9)]));
    let mut events = h.telemetry.subscribe();

    let orchestrator = CaptureOrchestrator::start(
        orchestrator_settings(4, 1),
        Arc::clone(&upload) as Arc<dyn UploadGateway>,
        Arc::clone(&analysis) as Arc<dyn AnalysisGateway>,
        Arc::clone(&h.decider),
        Arc::clone(&h.telemetry),
    );
    orchestrator.submit(capture_event("front-door")).unwrap();

    let outcome = next_outcome(&mut events).await;
    assert!(
        matches!(outcome, EventOutcome::Alerted { notified: true, .. }),
        "unexpected outcome {:?}",
        outcome
    );
    assert_eq!(upload.calls(), 3);
    assert_eq!(analysis.calls.load(Ordering::SeqCst), 1);

    let stored = h.store.snapshot().await;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].notified);
    assert!(stored[0].image_ref.starts_with("mem://captures/"));
    assert_eq!(h.notifier.sent().len(), 1);

    let report = orchestrator.shutdown(Duration::from_secs(1)).await;
    assert!(report.drained);
    assert_eq!(report.abandoned, 0);
}

#[tokio::test]
async fn test_exhausted_retries_fail_without_alert() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());
    let upload = Arc::new(FlakyUpload::new(u32::MAX));
    let mut events = h.telemetry.subscribe();

    let orchestrator = CaptureOrchestrator::start(
        orchestrator_settings(4, 1),
        Arc::clone(&upload) as Arc<dyn UploadGateway>,
        Arc::new(FixedAnalysis::new(&[("person", 0.9)])),
        Arc::clone(&h.decider),
        Arc::clone(&h.telemetry),
    );
    orchestrator.submit(capture_event("front-door")).unwrap();

    let outcome = next_outcome(&mut events).await;
    assert!(matches!(
        outcome,
        EventOutcome::Failed(CaptureFailure::Upload(GatewayError::Transient(_)))
    ));
    assert_eq!(upload.calls(), 3, "max_attempts bounds the calls");
    assert!(h.store.snapshot().await.is_empty());
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.telemetry.stats().failures, 1);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());
    let upload = Arc::new(FlakyUpload {
        permanent: true,
        ..FlakyUpload::new(u32::MAX)
    });
    let mut events = h.telemetry.subscribe();

    let orchestrator = CaptureOrchestrator::start(
        orchestrator_settings(4, 1),
        Arc::clone(&upload) as Arc<dyn UploadGateway>,
        Arc::new(FixedAnalysis::new(&[])),
        Arc::clone(&h.decider),
        Arc::clone(&h.telemetry),
    );
    orchestrator.submit(capture_event("front-door")).unwrap();

    let outcome = next_outcome(&mut events).await;
    assert!(matches!(
        outcome,
        EventOutcome::Failed(CaptureFailure::Upload(GatewayError::Permanent(_)))
    ));
    assert_eq!(upload.calls(), 1);
}

#[tokio::test]
async fn test_saturated_queue_rejects_deterministically() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());
    let orchestrator = CaptureOrchestrator::start(
        orchestrator_settings(2, 1),
        Arc::new(StuckUpload),
        Arc::new(FixedAnalysis::new(&[])),
        Arc::clone(&h.decider),
        Arc::clone(&h.telemetry),
    );
    assert_eq!(orchestrator.capacity(), 3);

    for _ in 0..3 {
        orchestrator.submit(capture_event("yard")).unwrap();
    }
    assert_eq!(
        orchestrator.submit(capture_event("yard")),
        Err(SubmitError::QueueFull)
    );
    assert_eq!(orchestrator.outstanding(), 3);

    // Nothing can finish, so shutdown cancels everything outstanding
    let report = orchestrator.shutdown(Duration::from_millis(20)).await;
    assert!(!report.drained);
    assert_eq!(report.abandoned, 0);
    assert_eq!(h.telemetry.stats().cancelled, 3);
    assert!(h.store.snapshot().await.is_empty());

    assert_eq!(
        orchestrator.submit(capture_event("yard")),
        Err(SubmitError::Closed)
    );
}

#[tokio::test]
async fn test_duplicate_submission_rejected() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());
    let orchestrator = CaptureOrchestrator::start(
        orchestrator_settings(4, 1),
        Arc::new(StuckUpload),
        Arc::new(FixedAnalysis::new(&[])),
        Arc::clone(&h.decider),
        Arc::clone(&h.telemetry),
    );

    let event = capture_event("yard");
    orchestrator.submit(event.clone()).unwrap();
    assert_eq!(orchestrator.submit(event), Err(SubmitError::Duplicate));
    assert_eq!(orchestrator.outstanding(), 1);

    orchestrator.shutdown(Duration::ZERO).await;
}

#[tokio::test]
async fn test_decider_filters_categories_and_confidence() {
    let h = harness(
        decider_settings(&["person", "weapon"], 0.8),
        RecordingNotifier::default(),
    );

    let decision = h
        .decider
        .decide(candidate("porch", &[("dog", 0.95), ("person", 0.6)]))
        .await
        .unwrap();
    assert_eq!(
        decision,
        Decision::Suppressed(SuppressReason::NoQualifyingLabel)
    );
    assert!(h.store.snapshot().await.is_empty());

    let decision = h
        .decider
        .decide(candidate("porch", &[("person", 0.85)]))
        .await
        .unwrap();
    let Decision::Alerted { alert, notified } = decision else {
        panic!("expected an alert, got {:?}", decision);
    };
    assert!(notified);
    assert_eq!(alert.category, "person");
    assert_eq!(alert.confidence, 0.85);

    let stored = h.store.snapshot().await;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].notified);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "security@example.com");
    assert!(sent[0].1.subject.contains("Person"));
}

#[tokio::test]
async fn test_concurrent_overlapping_alerts_are_merged() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());

    let (a, b) = tokio::join!(
        h.decider.decide(candidate("driveway", &[("person", 0.9)])),
        h.decider.decide(candidate("driveway", &[("person", 0.8)])),
    );
    let decisions = [a.unwrap(), b.unwrap()];

    let alerted = decisions
        .iter()
        .filter(|d| matches!(d, Decision::Alerted { .. }))
        .count();
    let merged = decisions
        .iter()
        .filter(|d| matches!(d, Decision::Suppressed(SuppressReason::DuplicateWindow { .. })))
        .count();
    assert_eq!(alerted, 1);
    assert_eq!(merged, 1);
    assert_eq!(h.store.snapshot().await.len(), 1);
    assert!(h.notifier.sent().len() <= 1);

    // Another camera is a separate dedup scope
    let other = h
        .decider
        .decide(candidate("backyard", &[("person", 0.9)]))
        .await
        .unwrap();
    assert!(matches!(other, Decision::Alerted { .. }));
}

#[tokio::test]
async fn test_same_event_alerts_once() {
    let mut settings = decider_settings(&["person"], 0.5);
    settings.dedup_window = Duration::ZERO;
    let h = harness(settings, RecordingNotifier::default());

    let first = candidate("porch", &[("person", 0.9)]);
    let second = AlertCandidate {
        analyzed_at: Utc::now(),
        ..first.clone()
    };

    assert!(matches!(
        h.decider.decide(first).await.unwrap(),
        Decision::Alerted { .. }
    ));
    assert_eq!(
        h.decider.decide(second).await.unwrap(),
        Decision::Suppressed(SuppressReason::DuplicateEvent)
    );
    assert_eq!(h.store.snapshot().await.len(), 1);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_insert_alert_is_idempotent_per_event() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());
    let Decision::Alerted { alert, .. } = h
        .decider
        .decide(candidate("porch", &[("person", 0.9)]))
        .await
        .unwrap()
    else {
        panic!("expected an alert");
    };

    let replay = watchpost::pipelines::Alert {
        alert_id: uuid::Uuid::new_v4(),
        ..alert
    };
    assert_eq!(
        h.store.insert_alert(replay).await.unwrap(),
        InsertOutcome::Duplicate
    );
    assert_eq!(h.store.snapshot().await.len(), 1);
}

#[tokio::test]
async fn test_notification_failure_keeps_alert() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::failing());

    let decision = h
        .decider
        .decide(candidate("porch", &[("person", 0.9)]))
        .await
        .unwrap();
    assert!(matches!(decision, Decision::Alerted { notified: false, .. }));

    let stored = h.store.snapshot().await;
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].notified);
    assert_eq!(h.telemetry.stats().notification_failures, 1);
}

#[tokio::test]
async fn test_event_deadline_fails_slow_event() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());
    let mut events = h.telemetry.subscribe();

    let mut settings = orchestrator_settings(4, 1);
    settings.event_deadline = Duration::from_millis(50);
    let orchestrator = CaptureOrchestrator::start(
        settings,
        Arc::new(StuckUpload),
        Arc::new(FixedAnalysis::new(&[("person", 0.9)])),
        Arc::clone(&h.decider),
        Arc::clone(&h.telemetry),
    );
    orchestrator.submit(capture_event("gate")).unwrap();

    assert_eq!(
        next_outcome(&mut events).await,
        EventOutcome::Failed(CaptureFailure::Deadline)
    );
    assert_eq!(orchestrator.outstanding(), 0);
    assert!(h.store.snapshot().await.is_empty());
    assert_eq!(h.telemetry.stats().failures, 1);

    let report = orchestrator.shutdown(Duration::from_secs(1)).await;
    assert!(report.drained);
}

#[tokio::test]
async fn test_transient_analysis_failures_are_retried() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());
    let analysis = Arc::new(FlakyAnalysis::new(2, false));
    let upload = Arc::new(FlakyUpload::new(0));
    let mut events = h.telemetry.subscribe();

    let orchestrator = CaptureOrchestrator::start(
        orchestrator_settings(4, 1),
        Arc::clone(&upload) as Arc<dyn UploadGateway>,
        Arc::clone(&analysis) as Arc<dyn AnalysisGateway>,
        Arc::clone(&h.decider),
        Arc::clone(&h.telemetry),
    );
    orchestrator.submit(capture_event("gate")).unwrap();

    let outcome = next_outcome(&mut events).await;
    assert!(matches!(outcome, EventOutcome::Alerted { notified: true, .. }));
    assert_eq!(analysis.calls.load(Ordering::SeqCst), 3);
    assert_eq!(upload.calls(), 1, "upload is not repeated for analysis retries");
    assert_eq!(h.store.snapshot().await.len(), 1);
}

#[tokio::test]
async fn test_permanent_analysis_failure_is_not_retried() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());
    let analysis = Arc::new(FlakyAnalysis::new(u32::MAX, true));
    let mut events = h.telemetry.subscribe();

    let orchestrator = CaptureOrchestrator::start(
        orchestrator_settings(4, 1),
        Arc::new(FlakyUpload::new(0)),
        Arc::clone(&analysis) as Arc<dyn AnalysisGateway>,
        Arc::clone(&h.decider),
        Arc::clone(&h.telemetry),
    );
    orchestrator.submit(capture_event("gate")).unwrap();

    let outcome = next_outcome(&mut events).await;
    assert!(matches!(
        outcome,
        EventOutcome::Failed(CaptureFailure::Analysis(GatewayError::Permanent(_)))
    ));
    assert_eq!(analysis.calls.load(Ordering::SeqCst), 1);
    assert!(h.store.snapshot().await.is_empty());
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_storage_failure_fails_event_without_notifying() {
    let notifier = Arc::new(RecordingNotifier::default());
    let telemetry = Arc::new(Telemetry::new());
    let decider = Arc::new(AlertDecider::new(
        decider_settings(&["person"], 0.5),
        Arc::new(BrokenStore),
        Arc::clone(&notifier) as Arc<dyn NotificationGateway>,
        Arc::clone(&telemetry),
    ));
    let mut events = telemetry.subscribe();

    let orchestrator = CaptureOrchestrator::start(
        orchestrator_settings(4, 1),
        Arc::new(FlakyUpload::new(0)),
        Arc::new(FixedAnalysis::new(&[("person", 0.95)])),
        decider,
        Arc::clone(&telemetry),
    );
    orchestrator.submit(capture_event("garage")).unwrap();

    let outcome = next_outcome(&mut events).await;
    assert!(
        matches!(outcome, EventOutcome::Failed(CaptureFailure::Storage(StorageError::Write(_)))),
        "unexpected outcome {:?}",
        outcome
    );
    assert!(notifier.sent().is_empty());
    assert_eq!(telemetry.stats().alerts, 0);
    assert_eq!(telemetry.stats().failures, 1);
}

#[tokio::test]
async fn test_stop_lets_in_flight_event_finish() {
    let h = harness(decider_settings(&["person"], 0.5), RecordingNotifier::default());
    let mut events = h.telemetry.subscribe();

    let orchestrator = CaptureOrchestrator::start(
        orchestrator_settings(4, 1),
        Arc::new(SlowUpload(Duration::from_millis(100))),
        Arc::new(FixedAnalysis::new(&[("person", 0.9)])),
        Arc::clone(&h.decider),
        Arc::clone(&h.telemetry),
    );
    orchestrator.submit(capture_event("porch")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = orchestrator.shutdown(Duration::from_secs(2)).await;
    assert!(report.drained);
    assert_eq!(report.abandoned, 0);

    let outcome = next_outcome(&mut events).await;
    assert!(matches!(outcome, EventOutcome::Alerted { .. }), "unexpected outcome {:?}", outcome);
    assert_eq!(h.telemetry.stats().cancelled, 0);
    assert_eq!(h.store.snapshot().await.len(), 1);
}
