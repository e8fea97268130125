// SPDX-License-Identifier: GPL-3.0-only

//! Host health report
//!
//! While a session runs, a background task samples CPU, memory and the disk
//! holding the capture directory every `health_interval` and broadcasts the
//! result as [`PipelineEvent::HealthReport`].

use crate::pipelines::telemetry::{PipelineEvent, Telemetry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Disks, System};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One health sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    /// Global CPU usage since the previous sample (0 - 100)
    pub cpu_percent: f32,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub memory_available_bytes: u64,
    pub memory_percent: f32,
    /// Filesystem holding the capture directory
    pub disk_total_bytes: u64,
    pub disk_free_bytes: u64,
    pub disk_percent: f32,
    pub system_uptime_secs: u64,
    /// Time since the monitoring session started
    pub session_uptime_secs: u64,
    pub sampled_at: DateTime<Utc>,
}

/// Samples host resources
///
/// CPU usage is a delta between two refreshes, so the first sample of a
/// fresh sampler reports 0 unless [`HealthSampler::warm_up`] ran first.
pub struct HealthSampler {
    system: System,
    disk_path: PathBuf,
}

impl HealthSampler {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self {
            system,
            disk_path: disk_path.into(),
        }
    }

    /// Wait long enough for the next sample to carry a CPU reading (blocking)
    pub fn warm_up(&mut self) {
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    }

    pub fn sample(&mut self, session_uptime: Duration) -> SystemHealth {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();

        let memory_total = self.system.total_memory();
        let memory_available = self.system.available_memory();
        let (disk_total, disk_free) = disk_usage(&self.disk_path);

        SystemHealth {
            cpu_percent: self.system.global_cpu_usage(),
            memory_total_bytes: memory_total,
            memory_used_bytes: self.system.used_memory(),
            memory_available_bytes: memory_available,
            memory_percent: used_percent(memory_total, memory_available),
            disk_total_bytes: disk_total,
            disk_free_bytes: disk_free,
            disk_percent: used_percent(disk_total, disk_free),
            system_uptime_secs: System::uptime(),
            session_uptime_secs: session_uptime.as_secs(),
            sampled_at: Utc::now(),
        }
    }
}

fn used_percent(total: u64, free: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (total.saturating_sub(free) as f64 / total as f64 * 100.0) as f32
}

/// Total and free bytes of the filesystem mounted closest to `path`
fn disk_usage(path: &Path) -> (u64, u64) {
    // The capture directory may not exist yet; its nearest ancestor still
    // lives on the right mount
    let resolved = path
        .ancestors()
        .find_map(|p| p.canonicalize().ok())
        .unwrap_or_else(|| PathBuf::from("/"));

    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| resolved.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| (disk.total_space(), disk.available_space()))
        .unwrap_or((0, 0))
}

/// Broadcast a health sample every `interval` until aborted
///
/// A zero interval disables the reporter. Must be called from within a
/// Tokio runtime.
pub fn spawn_reporter(
    disk_path: PathBuf,
    interval: Duration,
    telemetry: Arc<Telemetry>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if interval.is_zero() {
            return;
        }
        let mut sampler = HealthSampler::new(disk_path);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let uptime = telemetry.stats().uptime;

            // sysinfo reads /proc synchronously
            let sampled = tokio::task::spawn_blocking(move || {
                let health = sampler.sample(uptime);
                (sampler, health)
            })
            .await;

            match sampled {
                Ok((returned, health)) => {
                    sampler = returned;
                    debug!(
                        cpu = health.cpu_percent,
                        memory = health.memory_percent,
                        disk = health.disk_percent,
                        "Health sample"
                    );
                    telemetry.record(PipelineEvent::HealthReport(health));
                }
                Err(e) => {
                    warn!(error = %e, "Health sampling failed, reporter stopped");
                    break;
                }
            }
        }
    })
}
