// SPDX-License-Identifier: MPL-2.0

//! Monitoring session and control surface
//!
//! [`Monitor`] owns one camera session: it starts the frame loop thread and
//! the capture orchestrator, tears both down on `stop`, and exposes status,
//! statistics, the event bus and the latest frame to whatever drives it (the
//! CLI, or an outer request-handling layer).
//!
//! # Architecture
//!
//! - `state`: session lifecycle (`SessionStatus`, `CameraSession`)
//! - `pump`: one frame-loop iteration (grab, detect, debounce, submit)
//! - `analytics`: alert history summary

pub mod analytics;
mod pump;
pub mod state;

pub use analytics::AnalyticsSummary;
pub use state::{CameraSession, SessionStatus};

use crate::backends::analysis::{AnalysisGateway, HttpAnalysisGateway, NullAnalysisGateway};
use crate::backends::camera::{
    Frame, FrameLoopController, FrameSource, SourceResult, SourceSpec, open_source,
};
use crate::backends::notification::{LogNotifier, NotificationGateway, WebhookNotifier};
use crate::backends::persistence::{
    JsonAlertStore, MemoryAlertStore, PersistenceGateway, retention_cutoff,
};
use crate::backends::upload::{LocalUploadGateway, UploadGateway};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::pipelines::alert::AlertDecider;
use crate::pipelines::capture::{CaptureOrchestrator, ShutdownReport};
use crate::pipelines::health::{self, HealthSampler, SystemHealth};
use crate::pipelines::motion::{Debouncer, MotionTracker};
use crate::pipelines::telemetry::{PipelineEvent, PipelineStats, Telemetry};
use crate::storage;
use pump::FramePump;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Opens the frame source for a session
pub type SourceFactory = Arc<dyn Fn() -> SourceResult<Box<dyn FrameSource>> + Send + Sync>;

/// External collaborators of the pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub upload: Arc<dyn UploadGateway>,
    pub analysis: Arc<dyn AnalysisGateway>,
    pub persistence: Arc<dyn PersistenceGateway>,
    pub notifier: Arc<dyn NotificationGateway>,
}

impl Collaborators {
    /// Build the collaborators described by `config`
    ///
    /// A dry run keeps alerts in memory and only logs notifications. Without
    /// an `analysis_url` a dry run skips analysis; a real run refuses to start.
    pub async fn from_config(config: &Config, dry_run: bool) -> AppResult<Self> {
        let analysis: Arc<dyn AnalysisGateway> = match (&config.analysis_url, dry_run) {
            (Some(url), _) => Arc::new(HttpAnalysisGateway::new(url, config.attempt_timeout)),
            (None, true) => Arc::new(NullAnalysisGateway),
            (None, false) => {
                return Err(AppError::Config(
                    "analysis_url is not set (use --dry-run to run without a vision service)"
                        .into(),
                ));
            }
        };

        let persistence: Arc<dyn PersistenceGateway> = if dry_run {
            Arc::new(MemoryAlertStore::new())
        } else {
            Arc::new(JsonAlertStore::open(&config.alerts_path).await?)
        };

        let notifier: Arc<dyn NotificationGateway> = match (&config.webhook_url, dry_run) {
            (Some(url), false) => Arc::new(WebhookNotifier::new(url, config.attempt_timeout)),
            _ => Arc::new(LogNotifier),
        };

        Ok(Self {
            upload: Arc::new(
                LocalUploadGateway::new(&config.capture_dir).with_quality(config.jpeg_quality),
            ),
            analysis,
            persistence,
            notifier,
        })
    }
}

/// Everything that exists only while a session is active
struct ActivePipeline {
    frame_loop: FrameLoopController,
    orchestrator: Arc<CaptureOrchestrator>,
    health_reporter: Option<JoinHandle<()>>,
}

pub struct Monitor {
    config: Config,
    source_factory: SourceFactory,
    collaborators: Collaborators,
    session: Arc<Mutex<CameraSession>>,
    telemetry: Arc<Telemetry>,
    latest_frame: Arc<Mutex<Option<Frame>>>,
    // Serializes start/stop
    active: tokio::sync::Mutex<Option<ActivePipeline>>,
}

impl Monitor {
    pub fn new(config: Config, source_factory: SourceFactory, collaborators: Collaborators) -> Self {
        Self {
            config,
            source_factory,
            collaborators,
            session: Arc::new(Mutex::new(CameraSession::default())),
            telemetry: Arc::new(Telemetry::new()),
            latest_frame: Arc::new(Mutex::new(None)),
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// Monitor for a [`SourceSpec`]
    pub fn for_source(config: Config, spec: SourceSpec, collaborators: Collaborators) -> Self {
        let factory: SourceFactory = Arc::new(move || open_source(&spec));
        Self::new(config, factory, collaborators)
    }

    /// Start monitoring
    ///
    /// No-op if the session is already starting or running. Fails (leaving
    /// the session stopped with a fault) when the source cannot be opened.
    pub async fn start(&self) -> AppResult<()> {
        let mut active = self.active.lock().await;

        if !self.session.lock().unwrap().begin_start() {
            debug!("Session already active, start ignored");
            return Ok(());
        }

        // Leftovers of a session that faulted on its own
        if let Some(previous) = active.take() {
            Self::teardown(previous, self.config.drain_timeout).await;
        }

        info!(camera_id = %self.config.camera_id, "Starting monitoring session");
        self.purge_expired().await;

        let decider = Arc::new(
            AlertDecider::new(
                self.config.decider_settings(),
                Arc::clone(&self.collaborators.persistence),
                Arc::clone(&self.collaborators.notifier),
                Arc::clone(&self.telemetry),
            )
            .with_notify_timeout(self.config.attempt_timeout),
        );
        let orchestrator = Arc::new(CaptureOrchestrator::start(
            self.config.orchestrator_settings(),
            Arc::clone(&self.collaborators.upload),
            Arc::clone(&self.collaborators.analysis),
            decider,
            Arc::clone(&self.telemetry),
        ));

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<String, String>>();
        let factory = Arc::clone(&self.source_factory);
        let pump_orchestrator = Arc::clone(&orchestrator);
        let telemetry = Arc::clone(&self.telemetry);
        let session = Arc::clone(&self.session);
        let latest_frame = Arc::clone(&self.latest_frame);
        let config = self.config.clone();
        let runtime = tokio::runtime::Handle::current();

        let frame_loop = FrameLoopController::start_with_init(
            "watchpost-frames",
            self.config.sample_interval,
            move || match factory() {
                Ok(source) => {
                    let _ = ready_tx.send(Ok(source.describe()));
                    Ok(FramePump {
                        source,
                        tracker: MotionTracker::new(config.motion_settings()),
                        debouncer: Debouncer::new(&config.camera_id, config.debounce_settings()),
                        orchestrator: pump_orchestrator,
                        telemetry,
                        session,
                        latest_frame,
                        camera_id: config.camera_id.clone(),
                        runtime,
                        drain_timeout: config.drain_timeout,
                        consecutive_errors: 0,
                        rejected: 0,
                    })
                }
                Err(e) => {
                    let message = e.to_string();
                    let _ = ready_tx.send(Err(message.clone()));
                    Err(message)
                }
            },
            |pump: &mut FramePump| pump.step(),
            |_| {},
        );

        let mut pipeline = ActivePipeline {
            frame_loop,
            orchestrator,
            health_reporter: None,
        };

        let opened = ready_rx
            .await
            .unwrap_or_else(|_| Err("frame loop exited during start".to_string()));

        let description = match opened {
            Ok(description) => description,
            Err(reason) => {
                self.session.lock().unwrap().fail(reason.clone());
                Self::teardown(pipeline, Duration::ZERO).await;
                warn!(reason = %reason, "Failed to open frame source");
                return Err(AppError::Session(reason));
            }
        };

        if !self.session.lock().unwrap().mark_running() {
            // The source faulted before we got here; the pump already reported it
            let reason = self.fault().unwrap_or_else(|| "session stopped".to_string());
            *active = Some(pipeline);
            return Err(AppError::Session(reason));
        }

        self.telemetry.mark_started();
        if !self.config.health_interval.is_zero() {
            pipeline.health_reporter = Some(health::spawn_reporter(
                self.config.capture_dir.clone(),
                self.config.health_interval,
                Arc::clone(&self.telemetry),
            ));
        }
        self.telemetry.record(PipelineEvent::SessionStarted {
            camera_id: self.config.camera_id.clone(),
            source: description.clone(),
        });
        info!(camera_id = %self.config.camera_id, source = %description, "Monitoring session running");

        *active = Some(pipeline);
        Ok(())
    }

    /// Stop monitoring
    ///
    /// Stops the frame loop and intake, then lets in-flight events drain for
    /// `drain_timeout` before cancelling them. Returns `None` if nothing was
    /// running.
    pub async fn stop(&self) -> AppResult<Option<ShutdownReport>> {
        let mut active = self.active.lock().await;
        let Some(pipeline) = active.take() else {
            return Ok(None);
        };

        let was_active = self.session.lock().unwrap().begin_stop();
        info!(camera_id = %self.config.camera_id, "Stopping monitoring session");

        let report = Self::teardown(pipeline, self.config.drain_timeout).await;

        // A faulted session keeps its reason
        self.session.lock().unwrap().mark_stopped();
        if was_active {
            self.telemetry.mark_stopped();
            self.telemetry.record(PipelineEvent::SessionStopped {
                camera_id: self.config.camera_id.clone(),
                fault: None,
            });
        }

        info!(
            drained = report.drained,
            abandoned = report.abandoned,
            "Monitoring session stopped"
        );
        Ok(Some(report))
    }

    async fn teardown(pipeline: ActivePipeline, drain_timeout: Duration) -> ShutdownReport {
        let ActivePipeline {
            mut frame_loop,
            orchestrator,
            health_reporter,
        } = pipeline;

        if let Some(reporter) = health_reporter {
            reporter.abort();
        }

        // No new submissions from here on
        orchestrator.close();

        // Joining waits for a blocking grab to return
        if let Err(e) = tokio::task::spawn_blocking(move || frame_loop.stop()).await {
            warn!(error = %e, "Frame loop did not stop cleanly");
        }

        orchestrator.shutdown(drain_timeout).await
    }

    async fn purge_expired(&self) {
        if self.config.retention_days == 0 {
            return;
        }
        let age = Duration::from_secs(u64::from(self.config.retention_days) * 24 * 3600);

        match self.collaborators.persistence.purge_older_than(age).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, days = self.config.retention_days, "Purged expired alerts"),
            Err(e) => warn!(error = %e, "Failed to purge expired alerts"),
        }

        let removed =
            storage::purge_capture_dirs(&self.config.capture_dir, retention_cutoff(age)).await;
        if removed > 0 {
            info!(removed, "Purged expired capture directories");
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.session.lock().unwrap().status
    }

    pub fn session(&self) -> CameraSession {
        self.session.lock().unwrap().clone()
    }

    /// Why the last session ended on its own
    pub fn fault(&self) -> Option<String> {
        self.session.lock().unwrap().fault.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.telemetry.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.telemetry.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn persistence(&self) -> &Arc<dyn PersistenceGateway> {
        &self.collaborators.persistence
    }

    /// Sample host resources now
    ///
    /// Takes a little over the minimum CPU measurement interval.
    pub async fn health(&self) -> AppResult<SystemHealth> {
        let disk_path = self.config.capture_dir.clone();
        let uptime = self.telemetry.stats().uptime;
        tokio::task::spawn_blocking(move || {
            let mut sampler = HealthSampler::new(disk_path);
            sampler.warm_up();
            sampler.sample(uptime)
        })
        .await
        .map_err(|e| AppError::Other(format!("health sampling failed: {}", e)))
    }

    /// Last periodic health report of this monitor
    pub fn last_health(&self) -> Option<SystemHealth> {
        self.telemetry.last_health()
    }

    /// JPEG snapshot of the most recent frame
    pub fn latest_frame_jpeg(&self) -> Option<Vec<u8>> {
        let frame = self.latest_frame.lock().unwrap().clone()?;
        match frame.encode_jpeg(self.config.jpeg_quality) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                debug!(error = %e, "Snapshot encoding failed");
                None
            }
        }
    }

    /// Summary of stored alerts
    pub async fn analytics(
        &self,
        recent_limit: usize,
        category: Option<&str>,
    ) -> AppResult<AnalyticsSummary> {
        Ok(analytics::summarize(self.collaborators.persistence.as_ref(), recent_limit, category).await?)
    }
}
