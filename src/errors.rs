// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture and alert pipeline
//!
//! Failures are split by who can do something about them:
//! - [`GatewayError`]: upload/analysis/notification collaborators, transient or permanent
//! - [`SourceError`]: the frame source, where only fatal errors end a session
//! - [`SubmitError`]: orchestrator intake (backpressure is an expected outcome)
//! - [`StorageError`]: alert persistence
//! - [`AppError`]: everything surfaced to the binary

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type for collaborator calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type for persistence calls
pub type StorageResult<T> = Result<T, StorageError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Configuration errors (unreadable file, invalid value)
    Config(String),
    /// Storage/filesystem errors
    Storage(StorageError),
    /// Frame source errors
    Source(SourceError),
    /// Collaborator errors
    Gateway(GatewayError),
    /// Session lifecycle errors (start while the device is unavailable, etc.)
    Session(String),
    /// Generic error with message
    Other(String),
}

/// Failure taxonomy shared by the upload, analysis and notification collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Network or device hiccup, rate limiting, timeouts. Worth retrying.
    Transient(String),
    /// Malformed input, authentication failure, rejected request. Never retried.
    Permanent(String),
}

impl GatewayError {
    /// Whether a retry policy may try the call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// Frame source errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// A single grab failed; the next one may succeed
    Transient(String),
    /// The device is gone or cannot be opened
    Fatal(String),
}

/// Orchestrator intake rejections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Queue and workers are saturated; the event is shed
    QueueFull,
    /// An event with the same id is already queued or in flight
    Duplicate,
    /// The orchestrator no longer accepts work (session stopping)
    Closed,
}

/// Persistence errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Writing an alert failed; the event is treated as failed
    Write(String),
    /// Reading alerts failed
    Read(String),
}

/// Why an event was discarded without producing an alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureFailure {
    /// Upload failed permanently or exhausted its retry budget
    Upload(GatewayError),
    /// Analysis failed permanently or exhausted its retry budget
    Analysis(GatewayError),
    /// The per-event deadline expired
    Deadline,
    /// The alert could not be written
    Storage(StorageError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(e) => write!(f, "Storage error: {}", e),
            AppError::Source(e) => write!(f, "Frame source error: {}", e),
            AppError::Gateway(e) => write!(f, "Gateway error: {}", e),
            AppError::Session(msg) => write!(f, "Session error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Transient(msg) => write!(f, "transient failure: {}", msg),
            GatewayError::Permanent(msg) => write!(f, "permanent failure: {}", msg),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Transient(msg) => write!(f, "Frame grab failed: {}", msg),
            SourceError::Fatal(msg) => write!(f, "Frame source unavailable: {}", msg),
        }
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::QueueFull => write!(f, "Capture queue saturated"),
            SubmitError::Duplicate => write!(f, "Event already submitted"),
            SubmitError::Closed => write!(f, "Capture queue closed"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Write(msg) => write!(f, "Write failed: {}", msg),
            StorageError::Read(msg) => write!(f, "Read failed: {}", msg),
        }
    }
}

impl fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureFailure::Upload(e) => write!(f, "Upload failed: {}", e),
            CaptureFailure::Analysis(e) => write!(f, "Analysis failed: {}", e),
            CaptureFailure::Deadline => write!(f, "Event deadline exceeded"),
            CaptureFailure::Storage(e) => write!(f, "Alert not stored: {}", e),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for GatewayError {}
impl std::error::Error for SourceError {}
impl std::error::Error for SubmitError {}
impl std::error::Error for StorageError {}
impl std::error::Error for CaptureFailure {}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<SourceError> for AppError {
    fn from(err: SourceError) -> Self {
        AppError::Source(err)
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Gateway(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(StorageError::Write(err.to_string()))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(GatewayError::Transient("429".into()).is_retryable());
        assert!(!GatewayError::Permanent("400".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_cause() {
        let err = CaptureFailure::Upload(GatewayError::Transient("connection reset".into()));
        assert_eq!(
            err.to_string(),
            "Upload failed: transient failure: connection reset"
        );
    }

    #[test]
    fn test_storage_error_converts() {
        let err: AppError = StorageError::Write("disk full".into()).into();
        assert!(matches!(err, AppError::Storage(StorageError::Write(_))));
    }
}
