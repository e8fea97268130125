// SPDX-License-Identifier: MPL-2.0

//! Upload of captured frames

use crate::backends::camera::Frame;
use crate::constants::file_formats::JPEG_QUALITY;
use crate::errors::{GatewayError, GatewayResult};
use crate::pipelines::types::EventId;
use crate::storage;
use futures::future::BoxFuture;
use std::path::PathBuf;
use tracing::debug;

/// Stores the frame of a capture event somewhere the vision service can read it
pub trait UploadGateway: Send + Sync {
    /// Upload `frame` and return a reference to the stored image
    fn upload<'a>(&'a self, event_id: EventId, frame: &'a Frame) -> BoxFuture<'a, GatewayResult<String>>;
}

/// Writes captures as JPEG files under a local directory
///
/// Files are grouped per day (see [`storage::capture_path`]) and referenced
/// as `file://` URLs.
pub struct LocalUploadGateway {
    capture_dir: PathBuf,
    quality: u8,
}

impl LocalUploadGateway {
    pub fn new(capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            capture_dir: capture_dir.into(),
            quality: JPEG_QUALITY,
        }
    }

    /// JPEG quality, clamped to 1..=100
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }
}

impl UploadGateway for LocalUploadGateway {
    fn upload<'a>(&'a self, event_id: EventId, frame: &'a Frame) -> BoxFuture<'a, GatewayResult<String>> {
        Box::pin(async move {
            let quality = self.quality;
            let owned = frame.clone();

            // Encoding is CPU bound
            let jpeg = tokio::task::spawn_blocking(move || owned.encode_jpeg(quality))
                .await
                .map_err(|e| GatewayError::Transient(format!("encoder task failed: {}", e)))?
                .map_err(GatewayError::Permanent)?;

            let path = storage::capture_path(&self.capture_dir, &event_id.to_string(), frame.timestamp);
            storage::ensure_parent_dir(&path)
                .await
                .map_err(|e| GatewayError::Transient(format!("{}: {}", path.display(), e)))?;
            tokio::fs::write(&path, &jpeg)
                .await
                .map_err(|e| GatewayError::Transient(format!("{}: {}", path.display(), e)))?;

            debug!(event_id = %event_id, path = %path.display(), bytes = jpeg.len(), "Capture stored");
            Ok(storage::file_reference(&path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::PixelFormat;

    #[tokio::test]
    async fn test_upload_writes_jpeg_and_returns_file_reference() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = LocalUploadGateway::new(dir.path());
        let frame = Frame::new(0, 16, 16, PixelFormat::Rgb8, vec![200u8; 16 * 16 * 3]);

        let reference = gateway.upload(EventId::new(), &frame).await.unwrap();
        let path = storage::path_from_reference(&reference).unwrap();

        assert!(path.starts_with(dir.path()));
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_quality_controls_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let noise: Vec<u8> = (0..64 * 64 * 3).map(|i| (i * 7919 % 251) as u8).collect();
        let frame = Frame::new(0, 64, 64, PixelFormat::Rgb8, noise);

        let mut sizes = Vec::new();
        for quality in [10, 95] {
            let gateway = LocalUploadGateway::new(dir.path()).with_quality(quality);
            let reference = gateway.upload(EventId::new(), &frame).await.unwrap();
            let path = storage::path_from_reference(&reference).unwrap();
            sizes.push(std::fs::metadata(&path).unwrap().len());
        }
        assert!(sizes[0] < sizes[1], "sizes {:?}", sizes);
    }

    #[tokio::test]
    async fn test_corrupt_frame_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = LocalUploadGateway::new(dir.path());
        let frame = Frame::new(0, 16, 16, PixelFormat::Rgb8, vec![0u8; 4]);

        let err = gateway.upload(EventId::new(), &frame).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
