// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the monitoring session, driven by image directories

use futures::future::BoxFuture;
use image::{GrayImage, Luma};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use watchpost::app::{Collaborators, Monitor, SessionStatus};
use watchpost::backends::analysis::{AnalysisGateway, NullAnalysisGateway};
use watchpost::backends::camera::SourceSpec;
use watchpost::backends::notification::LogNotifier;
use watchpost::backends::persistence::MemoryAlertStore;
use watchpost::backends::upload::LocalUploadGateway;
use watchpost::errors::{AppError, GatewayResult};
use watchpost::pipelines::{DetectedLabel, EventOutcome, PipelineEvent};
use watchpost::Config;

struct PersonAnalysis;

impl AnalysisGateway for PersonAnalysis {
    fn analyze<'a>(&'a self, _image_ref: &'a str) -> BoxFuture<'a, GatewayResult<Vec<DetectedLabel>>> {
        Box::pin(async { Ok(vec![DetectedLabel::new("person", 0.92)]) })
    }
}

/// Write `levels` as numbered grayscale frames
fn write_frames(dir: &Path, levels: &[u8]) {
    for (i, level) in levels.iter().enumerate() {
        GrayImage::from_pixel(64, 48, Luma([*level]))
            .save(dir.join(format!("frame_{:03}.png", i)))
            .unwrap();
    }
}

fn test_config(work: &Path) -> Config {
    Config {
        camera_id: "test-cam".into(),
        sample_interval: Duration::from_millis(10),
        quiet_duration: Duration::from_millis(30),
        burst_window: Duration::from_secs(1),
        cooldown: Duration::from_secs(30),
        drain_timeout: Duration::from_secs(2),
        capture_dir: work.join("captures"),
        alerts_path: work.join("alerts.jsonl"),
        retention_days: 0,
        ..Config::default()
    }
}

fn collaborators(work: &Path, analysis: Arc<dyn AnalysisGateway>) -> Collaborators {
    Collaborators {
        upload: Arc::new(LocalUploadGateway::new(work.join("captures"))),
        analysis,
        persistence: Arc::new(MemoryAlertStore::new()),
        notifier: Arc::new(LogNotifier),
    }
}

fn directory_monitor(frames: &TempDir, work: &TempDir, looping: bool) -> Monitor {
    let spec = SourceSpec::Directory {
        path: frames.path().to_path_buf(),
        looping,
    };
    Monitor::for_source(
        test_config(work.path()),
        spec,
        collaborators(work.path(), Arc::new(NullAnalysisGateway)),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_is_idempotent_and_stop_ends_session() {
    let frames = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_frames(frames.path(), &[40, 40, 40]);

    let monitor = directory_monitor(&frames, &work, true);
    assert_eq!(monitor.status(), SessionStatus::Stopped);

    monitor.start().await.unwrap();
    monitor.start().await.unwrap();
    assert_eq!(monitor.status(), SessionStatus::Running);

    wait_until(|| monitor.stats().frames_sampled >= 5).await;
    let snapshot = monitor.latest_frame_jpeg().expect("snapshot available");
    assert_eq!(&snapshot[..2], &[0xFF, 0xD8], "snapshot is a JPEG");

    let report = monitor.stop().await.unwrap().expect("session was running");
    assert!(report.drained);
    assert_eq!(monitor.status(), SessionStatus::Stopped);
    assert_eq!(monitor.fault(), None);

    assert!(monitor.stop().await.unwrap().is_none(), "second stop is a no-op");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exhausted_source_faults_session() {
    let frames = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_frames(frames.path(), &[40, 40, 40, 40, 40]);

    let monitor = directory_monitor(&frames, &work, false);
    let mut events = monitor.subscribe();
    // The source may run dry before start returns
    let _ = monitor.start().await;

    wait_until(|| monitor.status() == SessionStatus::Stopped).await;
    let fault = monitor.fault().expect("fault recorded");
    assert!(fault.contains("exhausted"), "unexpected fault: {}", fault);

    let stopped = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(PipelineEvent::SessionStopped { fault, .. }) = events.recv().await {
                return fault;
            }
        }
    })
    .await
    .unwrap();
    assert!(stopped.is_some());

    // A faulted session can be restarted
    monitor.stop().await.unwrap();
    let _ = monitor.start().await;
    wait_until(|| monitor.status() == SessionStatus::Stopped).await;
}

#[tokio::test]
async fn test_unavailable_source_fails_start() {
    let work = tempfile::tempdir().unwrap();
    let spec = SourceSpec::Directory {
        path: work.path().join("missing"),
        looping: false,
    };
    let monitor = Monitor::for_source(
        test_config(work.path()),
        spec,
        collaborators(work.path(), Arc::new(NullAnalysisGateway)),
    );

    let err = monitor.start().await.unwrap_err();
    assert!(matches!(err, AppError::Session(_)));
    assert_eq!(monitor.status(), SessionStatus::Stopped);
    assert!(monitor.fault().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_motion_produces_alert() {
    let frames = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    // Dark scene, then the lights come on and stay on
    let mut levels = vec![10u8; 3];
    levels.extend([230u8; 12]);
    write_frames(frames.path(), &levels);

    let spec = SourceSpec::Directory {
        path: frames.path().to_path_buf(),
        looping: true,
    };
    let monitor = Monitor::for_source(
        test_config(work.path()),
        spec,
        collaborators(work.path(), Arc::new(PersonAnalysis)),
    );
    let mut events = monitor.subscribe();
    monitor.start().await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(PipelineEvent::EventCompleted { outcome, .. }) = events.recv().await {
                return outcome;
            }
        }
    })
    .await
    .expect("no event completed");
    // LogNotifier accepts, but there is no recipient configured
    assert!(
        matches!(outcome, EventOutcome::Alerted { notified: false, .. }),
        "unexpected outcome {:?}",
        outcome
    );

    monitor.stop().await.unwrap();

    let summary = monitor.analytics(10, None).await.unwrap();
    assert_eq!(summary.total, 1, "cooldown keeps the loop restart from alerting");
    assert_eq!(summary.by_category["person"], 1);
    assert!(summary.recent[0].image_ref.starts_with("file://"));
    assert!(monitor.stats().motion_frames >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_running_session_reports_health() {
    let frames = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_frames(frames.path(), &[40, 40, 40]);

    let config = Config {
        health_interval: Duration::from_millis(20),
        ..test_config(work.path())
    };
    let spec = SourceSpec::Directory {
        path: frames.path().to_path_buf(),
        looping: true,
    };
    let monitor = Monitor::for_source(
        config,
        spec,
        collaborators(work.path(), Arc::new(NullAnalysisGateway)),
    );
    let mut events = monitor.subscribe();
    monitor.start().await.unwrap();

    let health = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(PipelineEvent::HealthReport(health)) = events.recv().await {
                return health;
            }
        }
    })
    .await
    .expect("no health report");
    assert!(health.memory_total_bytes > 0);
    assert!(monitor.last_health().is_some());

    let on_demand = monitor.health().await.unwrap();
    assert!((0.0..=100.0).contains(&on_demand.memory_percent));

    monitor.stop().await.unwrap();
}
