// SPDX-License-Identifier: MPL-2.0

//! Storage layout for captures, alerts and configuration

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application directory name under the platform data/config directories
pub const APP_DIR_NAME: &str = "watchpost";

/// Root directory for captured frames and the alert log
///
/// `~/.local/share/watchpost` on Linux, falling back to the home directory
/// and finally the working directory.
pub fn data_directory() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Default configuration file path (`~/.config/watchpost/config.json`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.json"))
}

/// Default directory for uploaded captures
pub fn default_capture_dir() -> PathBuf {
    data_directory().join("captures")
}

/// Default alert log path
pub fn default_alerts_path() -> PathBuf {
    data_directory().join("alerts.jsonl")
}

/// Path of the JPEG written for one capture event
///
/// Captures are grouped per day so retention can remove whole directories:
/// `<capture_dir>/2024-05-01/motion_20240501_142233_<event>.jpg`
pub fn capture_path(capture_dir: &Path, event_id: &str, timestamp: DateTime<Utc>) -> PathBuf {
    let day = timestamp.format("%Y-%m-%d").to_string();
    let filename = format!("motion_{}_{}.jpg", timestamp.format("%Y%m%d_%H%M%S"), event_id);
    capture_dir.join(day).join(filename)
}

/// `file://` reference for a local capture
pub fn file_reference(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Resolve a `file://` reference back to a path
pub fn path_from_reference(reference: &str) -> Option<PathBuf> {
    reference.strip_prefix("file://").map(PathBuf::from)
}

/// Ensure the parent directory of `path` exists
pub async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Remove per-day capture directories older than `cutoff`
///
/// Directories whose name does not parse as a date are left alone.
/// Returns the number of directories removed.
pub async fn purge_capture_dirs(capture_dir: &Path, cutoff: DateTime<Utc>) -> usize {
    let cutoff_day = cutoff.date_naive();
    let mut removed = 0;

    let mut entries = match tokio::fs::read_dir(capture_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %capture_dir.display(), error = %e, "No capture directory to purge");
            return 0;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(day) = name
            .to_str()
            .and_then(|n| chrono::NaiveDate::parse_from_str(n, "%Y-%m-%d").ok())
        else {
            continue;
        };

        if day < cutoff_day {
            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove capture directory"),
            }
        }
    }

    removed
}
