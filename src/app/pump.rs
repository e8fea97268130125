// SPDX-License-Identifier: GPL-3.0-only

//! One iteration of the frame loop: grab, detect, debounce, submit

use crate::app::state::CameraSession;
use crate::backends::camera::{Frame, FrameSource, LoopAction};
use crate::constants::timing::{
    FRAME_LOG_INTERVAL, MAX_CONSECUTIVE_SOURCE_ERRORS, REJECTION_LOG_INTERVAL, SOURCE_RETRY_DELAY,
};
use crate::errors::{SourceError, SubmitError};
use crate::pipelines::capture::CaptureOrchestrator;
use crate::pipelines::motion::{Debouncer, MotionTracker};
use crate::pipelines::telemetry::{PipelineEvent, Telemetry};
use crate::pipelines::types::CaptureEvent;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, warn};

/// State owned by the frame loop thread
pub(crate) struct FramePump {
    pub source: Box<dyn FrameSource>,
    pub tracker: MotionTracker,
    pub debouncer: Debouncer,
    pub orchestrator: Arc<CaptureOrchestrator>,
    pub telemetry: Arc<Telemetry>,
    pub session: Arc<Mutex<CameraSession>>,
    pub latest_frame: Arc<Mutex<Option<Frame>>>,
    pub camera_id: String,
    pub runtime: tokio::runtime::Handle,
    pub drain_timeout: Duration,
    pub consecutive_errors: u32,
    pub rejected: u64,
}

impl FramePump {
    pub fn step(&mut self) -> LoopAction {
        match self.source.next_frame() {
            Ok(Some(frame)) => {
                self.consecutive_errors = 0;
                self.process(frame);
                LoopAction::Continue
            }
            Ok(None) => self.fault("frame source exhausted".to_string()),
            Err(SourceError::Fatal(msg)) => self.fault(msg),
            Err(SourceError::Transient(msg)) => {
                self.consecutive_errors += 1;
                self.telemetry.source_error();

                if self.consecutive_errors > MAX_CONSECUTIVE_SOURCE_ERRORS {
                    return self.fault(format!(
                        "{} consecutive frame grabs failed, last: {}",
                        self.consecutive_errors, msg
                    ));
                }
                if self.consecutive_errors == 1 || self.consecutive_errors % 10 == 0 {
                    warn!(
                        consecutive = self.consecutive_errors,
                        error = %msg,
                        "Frame grab failed"
                    );
                }
                std::thread::sleep(SOURCE_RETRY_DELAY);
                LoopAction::Continue
            }
        }
    }

    fn process(&mut self, frame: Frame) {
        let signal = self.tracker.observe(&frame);
        self.telemetry.frame_sampled(signal.triggered);

        if frame.sequence % FRAME_LOG_INTERVAL == 0 {
            debug!(
                sequence = frame.sequence,
                width = frame.width,
                height = frame.height,
                score = signal.score,
                "Frame sampled"
            );
        }

        let closed = self.debouncer.observe(&signal, &frame);
        *self.latest_frame.lock().unwrap() = Some(frame);

        if let Some(event) = closed {
            self.submit(event);
        }
    }

    fn submit(&mut self, event: CaptureEvent) {
        let event_id = event.event_id;
        let camera_id = event.camera_id.clone();
        let score = event.trigger_score;

        match self.orchestrator.submit(event) {
            Ok(()) => {
                debug!(event_id = %event_id, score, "Capture event submitted");
                self.telemetry.record(PipelineEvent::EventSubmitted {
                    event_id,
                    camera_id,
                    score,
                });
            }
            Err(reason) => {
                self.rejected += 1;
                if reason == SubmitError::QueueFull && self.rejected % REJECTION_LOG_INTERVAL == 1 {
                    warn!(
                        event_id = %event_id,
                        rejected_total = self.rejected,
                        "Capture queue saturated, dropping event"
                    );
                } else {
                    debug!(event_id = %event_id, reason = %reason, "Capture event rejected");
                }
                self.telemetry.record(PipelineEvent::EventRejected { event_id, reason });
            }
        }
    }

    /// End the session because the source is unusable
    fn fault(&mut self, reason: String) -> LoopAction {
        error!(camera_id = %self.camera_id, reason = %reason, "Frame source fault, stopping session");

        self.orchestrator.close();
        self.session.lock().unwrap().fail(reason.clone());
        self.telemetry.mark_stopped();
        self.telemetry.record(PipelineEvent::SessionStopped {
            camera_id: self.camera_id.clone(),
            fault: Some(reason),
        });

        let orchestrator = Arc::clone(&self.orchestrator);
        let drain_timeout = self.drain_timeout;
        self.runtime.spawn(async move {
            orchestrator.shutdown(drain_timeout).await;
        });

        LoopAction::Stop
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.debouncer.reset();
    }
}
