// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Running a monitoring session
//! - Summarizing stored alerts
//! - Purging expired alerts and captures
//! - Reporting host health
//! - Showing or writing the configuration

use std::path::Path;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use watchpost::app::{Collaborators, Monitor};
use watchpost::backends::camera::SourceSpec;
use watchpost::backends::persistence::{JsonAlertStore, PersistenceGateway, retention_cutoff};
use watchpost::constants::MotionSensitivity;
use watchpost::pipelines::health::HealthSampler;
use watchpost::pipelines::{EventOutcome, PipelineEvent, SystemHealth};
use watchpost::{Config, storage};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("watchpost-worker")
        .build()
}

/// Run a monitoring session until Ctrl+C, a source fault or `duration`
pub fn run(
    config_path: Option<&Path>,
    source: &str,
    dry_run: bool,
    sensitivity: Option<&str>,
    duration: Option<u64>,
) -> CliResult {
    let mut config = Config::load(config_path)?;
    if let Some(name) = sensitivity {
        let preset = MotionSensitivity::from_name(name)
            .ok_or_else(|| format!("Unknown sensitivity '{}' (low, medium, high)", name))?;
        config.apply_sensitivity(preset);
    }
    let spec: SourceSpec = source.parse()?;

    // Set up Ctrl+C handler
    let (stop_tx, mut stop_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(true);
    })?;

    runtime()?.block_on(async move {
        let collaborators = Collaborators::from_config(&config, dry_run).await?;
        let monitor = Monitor::for_source(config, spec.clone(), collaborators);
        let mut events = monitor.subscribe();

        monitor.start().await?;
        println!("Watching {} (camera {})", spec, monitor.config().camera_id);
        if dry_run {
            println!("Dry run: alerts are kept in memory, notifications are only logged");
        }
        println!("Press Ctrl+C to stop");

        let deadline = async {
            match duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    println!();
                    println!("Stopping...");
                    break;
                }
                _ = &mut deadline => break,
                event = events.recv() => match event {
                    Ok(PipelineEvent::SessionStopped { fault: Some(reason), .. }) => {
                        eprintln!("Session stopped: {}", reason);
                        break;
                    }
                    Ok(event) => print_event(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        eprintln!("({} events not shown)", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        if let Some(report) = monitor.stop().await? {
            if report.abandoned > 0 {
                println!("{} in-flight events abandoned", report.abandoned);
            }
        }

        let stats = monitor.stats();
        println!();
        println!("Frames sampled:   {}", stats.frames_sampled);
        println!("Events submitted: {}", stats.events_submitted);
        println!("Events dropped:   {}", stats.events_rejected);
        println!("Alerts:           {}", stats.alerts);
        println!("Suppressed:       {}", stats.suppressed);
        println!("Failures:         {}", stats.failures);

        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

fn print_event(event: &PipelineEvent) {
    let now = chrono::Local::now().format("%H:%M:%S");
    match event {
        PipelineEvent::EventSubmitted { event_id, score, .. } => {
            println!("[{}] motion {} (score {:.3})", now, event_id, score);
        }
        PipelineEvent::EventRejected { event_id, reason } => {
            println!("[{}] dropped {}: {}", now, event_id, reason);
        }
        PipelineEvent::EventCompleted {
            event_id, outcome, ..
        } => match outcome {
            EventOutcome::Alerted { alert_id, notified } => println!(
                "[{}] ALERT {} for {}{}",
                now,
                alert_id,
                event_id,
                if *notified { " (notified)" } else { "" }
            ),
            EventOutcome::Suppressed(reason) => {
                println!("[{}] {} suppressed: {}", now, event_id, reason)
            }
            EventOutcome::Failed(failure) => println!("[{}] {} failed: {}", now, event_id, failure),
            EventOutcome::Cancelled => println!("[{}] {} cancelled", now, event_id),
        },
        PipelineEvent::NotificationFailed { alert_id, error } => {
            println!("[{}] notification for {} failed: {}", now, alert_id, error);
        }
        PipelineEvent::HealthReport(health) => {
            println!("[{}] health: {}", now, health_line(health));
        }
        PipelineEvent::SessionStarted { .. } | PipelineEvent::SessionStopped { .. } => {}
    }
}

fn health_line(health: &SystemHealth) -> String {
    format!(
        "cpu {:.1}%, memory {:.1}% ({} MiB free), disk {:.1}% ({} MiB free)",
        health.cpu_percent,
        health.memory_percent,
        health.memory_available_bytes / 1024 / 1024,
        health.disk_percent,
        health.disk_free_bytes / 1024 / 1024
    )
}

/// Print one host health sample
pub fn health(config_path: Option<&Path>, json: bool) -> CliResult {
    let config = Config::load(config_path)?;
    let mut sampler = HealthSampler::new(&config.capture_dir);
    sampler.warm_up();
    let health = sampler.sample(Duration::ZERO);

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        println!("{}", health_line(&health));
        println!("System uptime: {}s", health.system_uptime_secs);
    }
    Ok(())
}

/// Summarize the alert log
pub fn analytics(
    config_path: Option<&Path>,
    limit: usize,
    category: Option<&str>,
    json: bool,
) -> CliResult {
    let config = Config::load(config_path)?;

    runtime()?.block_on(async move {
        let store = JsonAlertStore::open(&config.alerts_path).await?;
        let summary = watchpost::app::analytics::summarize(&store, limit, category).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }

        println!("Alerts:            {}", summary.total);
        println!(
            "Notified:          {} ({:.0}%)",
            summary.notified,
            summary.notification_rate * 100.0
        );
        if !summary.by_category.is_empty() {
            println!();
            println!("By category:");
            for (category, count) in &summary.by_category {
                println!("  {:<12} {}", category, count);
            }
        }
        if !summary.recent.is_empty() {
            println!();
            println!("Most recent:");
            for alert in &summary.recent {
                println!(
                    "  {}  {:<10} {:>5.1}%  {}  {}",
                    alert.created_at.format("%Y-%m-%d %H:%M:%S"),
                    alert.category,
                    alert.confidence * 100.0,
                    alert.camera_id,
                    alert.image_ref
                );
            }
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

/// Delete expired alerts and capture directories
pub fn purge(config_path: Option<&Path>, days: Option<u32>) -> CliResult {
    let config = Config::load(config_path)?;
    let days = days.unwrap_or(config.retention_days);
    if days == 0 {
        return Err("Retention of 0 days would delete everything; pass --days".into());
    }
    let age = Duration::from_secs(u64::from(days) * 24 * 3600);

    runtime()?.block_on(async move {
        let store = JsonAlertStore::open(&config.alerts_path).await?;
        let alerts = store.purge_older_than(age).await?;
        let dirs = storage::purge_capture_dirs(&config.capture_dir, retention_cutoff(age)).await;
        println!(
            "Removed {} alerts and {} capture directories older than {} days",
            alerts, dirs, days
        );
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

/// Print (and optionally write) the effective configuration
pub fn show_config(config_path: Option<&Path>, write: bool) -> CliResult {
    let config = Config::load(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);

    if write {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => storage::default_config_path()
                .ok_or("No configuration directory on this system; pass --config")?,
        };
        config.save(&path)?;
        println!();
        println!("Written to {}", path.display());
    }
    Ok(())
}
