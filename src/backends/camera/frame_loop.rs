// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle for the frame-pull loop
//!
//! Frame sources block on device I/O, so the loop that pulls frames and
//! drives motion detection runs on its own OS thread instead of the async
//! runtime. The controller owns that thread: it paces iterations to the
//! sample interval, exposes a stop flag, and joins the thread on drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a frame loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let controller = FrameLoopController::start_with_init(
///     "frame-loop",
///     Duration::from_millis(50),
///     || open_source(&spec).map_err(|e| e.to_string()),
///     move |source| match source.next_frame() {
///         Ok(Some(frame)) => { process(frame); LoopAction::Continue }
///         Ok(None) => LoopAction::Stop,
///         Err(_) => LoopAction::Continue,
///     },
///     |err| warn!(%err, "source failed to open"),
/// );
///
/// controller.stop();
/// ```
pub struct FrameLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl FrameLoopController {
    /// Start a loop that calls `loop_fn` once per `interval`
    ///
    /// The interval is measured from the start of one iteration to the start
    /// of the next; an iteration that overruns is followed immediately by the
    /// next one. A zero interval runs back to back.
    pub fn start<F>(name: &str, interval: Duration, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::start_with_init(name, interval, || Ok(()), move |_: &mut ()| loop_fn(), |_| {})
    }

    /// Start a loop with initialization
    ///
    /// `init_fn` runs once on the loop thread (device handles are opened on
    /// the thread that uses them). If it fails, `on_init_error` receives the
    /// message and the thread exits without running `loop_fn`.
    pub fn start_with_init<S, I, F, E>(
        name: &str,
        interval: Duration,
        init_fn: I,
        mut loop_fn: F,
        on_init_error: E,
    ) -> Self
    where
        S: 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, interval_ms = interval.as_millis() as u64, "Starting frame loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Frame loop thread started, initializing...");

                let mut state = match init_fn() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(name = %name_clone, error = %e, "Initialization failed");
                        on_init_error(e);
                        return;
                    }
                };

                loop {
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    let iteration_start = Instant::now();
                    if loop_fn(&mut state) == LoopAction::Stop {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }

                    if let Some(remaining) = interval.checked_sub(iteration_start.elapsed()) {
                        sleep_unless_stopped(remaining, &stop_signal_clone);
                    }
                }

                info!(name = %name_clone, "Frame loop thread exiting");
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn frame loop thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting frame loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    ///
    /// Returns once the current iteration (including a blocking frame grab)
    /// has completed.
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for frame loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Frame loop thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for FrameLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "FrameLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

/// Sleep in short slices so a stop request is honored promptly
fn sleep_unless_stopped(duration: Duration, stop_signal: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(10);
    // An unrepresentable deadline sleeps until stopped
    let deadline = Instant::now().checked_add(duration);
    loop {
        if stop_signal.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        let remaining = match deadline {
            Some(deadline) if now >= deadline => return,
            Some(deadline) => deadline - now,
            None => SLICE,
        };
        thread::sleep(SLICE.min(remaining));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = FrameLoopController::start("test-loop", Duration::ZERO, move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            if count >= 10 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });

        controller.join();
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_interval_paces_iterations() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller =
            FrameLoopController::start("test-paced", Duration::from_millis(100), move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            });

        thread::sleep(Duration::from_millis(250));
        controller.stop();

        // Roughly 3 iterations in 250ms, never dozens
        let count = counter.load(Ordering::SeqCst);
        assert!((1..=5).contains(&count), "ran {} times", count);
    }

    #[test]
    fn test_stop_interrupts_long_interval() {
        let mut controller =
            FrameLoopController::start("test-long", Duration::from_secs(30), || LoopAction::Continue);

        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        controller.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!controller.is_running());
    }

    #[test]
    fn test_unbounded_sleep_waits_for_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let sleeper = thread::spawn(move || sleep_unless_stopped(Duration::MAX, &stop_clone));

        thread::sleep(Duration::from_millis(30));
        assert!(!sleeper.is_finished());
        stop.store(true, Ordering::SeqCst);
        sleeper.join().unwrap();
    }

    #[test]
    fn test_with_init() {
        let result = Arc::new(AtomicU32::new(0));
        let result_clone = Arc::clone(&result);

        let mut controller = FrameLoopController::start_with_init(
            "test-init-loop",
            Duration::ZERO,
            || Ok(42u32),
            move |state| {
                result_clone.store(*state, Ordering::SeqCst);
                LoopAction::Stop
            },
            |_| {},
        );

        controller.join();
        assert_eq!(result.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_init_failure_reports_and_skips_loop() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let reported = Arc::new(AtomicBool::new(false));
        let reported_clone = Arc::clone(&reported);

        let mut controller = FrameLoopController::start_with_init(
            "test-fail-init",
            Duration::ZERO,
            || Err::<(), _>("no device".to_string()),
            move |_: &mut ()| {
                ran_clone.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
            move |_| reported_clone.store(true, Ordering::SeqCst),
        );

        controller.join();
        assert!(!ran.load(Ordering::SeqCst));
        assert!(reported.load(Ordering::SeqCst));
    }
}
