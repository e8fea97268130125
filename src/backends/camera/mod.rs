// SPDX-License-Identifier: MPL-2.0

//! Frame sources
//!
//! ```text
//! ┌──────────────────────┐
//! │ Monitor (app)        │
//! └──────────┬───────────┘
//!            │ FrameLoopController (dedicated thread)
//!            ▼
//! ┌──────────────────────┐
//! │  FrameSource trait   │  ← next_frame() in arrival order
//! └──────────┬───────────┘
//!            │
//!      ┌─────┴──────┐
//!      ▼            ▼
//!  ┌───────┐  ┌───────────┐
//!  │ V4L2  │  │ Directory │
//!  └───────┘  └───────────┘
//! ```

pub mod directory;
pub mod frame_loop;
pub mod types;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod v4l2;

pub use directory::DirectorySource;
pub use frame_loop::{FrameLoopController, LoopAction};
pub use types::*;

use crate::errors::SourceError;
use std::path::PathBuf;
use std::str::FromStr;

/// A camera (or camera stand-in) that yields frames one at a time
///
/// Implementations block in `next_frame` until a frame is available. They are
/// driven from a single dedicated thread, so they need `Send` but not `Sync`.
pub trait FrameSource: Send {
    /// Pull the next frame
    ///
    /// * `Ok(Some(frame))` - a new frame
    /// * `Ok(None)` - the source is exhausted and will never yield again
    /// * `Err(SourceError::Transient)` - this grab failed, try again
    /// * `Err(SourceError::Fatal)` - the device is gone
    fn next_frame(&mut self) -> SourceResult<Option<Frame>>;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

/// Where frames come from, as given on the command line
///
/// `dir:<path>` replays a directory of images, `dir-loop:<path>` replays it
/// forever, `v4l2:<device>` opens a V4L2 capture device. A bare `/dev/...`
/// path is accepted as a V4L2 device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Directory { path: PathBuf, looping: bool },
    V4l2 { device: String },
}

impl Default for SourceSpec {
    fn default() -> Self {
        SourceSpec::V4l2 {
            device: "/dev/video0".to_string(),
        }
    }
}

impl FromStr for SourceSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("dir:") {
            return Ok(SourceSpec::Directory {
                path: PathBuf::from(path),
                looping: false,
            });
        }
        if let Some(path) = s.strip_prefix("dir-loop:") {
            return Ok(SourceSpec::Directory {
                path: PathBuf::from(path),
                looping: true,
            });
        }
        if let Some(device) = s.strip_prefix("v4l2:") {
            return Ok(SourceSpec::V4l2 {
                device: device.to_string(),
            });
        }
        if s.starts_with("/dev/") {
            return Ok(SourceSpec::V4l2 {
                device: s.to_string(),
            });
        }
        Err(format!(
            "Unknown source '{}', expected dir:<path>, dir-loop:<path> or v4l2:<device>",
            s
        ))
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Directory {
                path,
                looping: false,
            } => write!(f, "dir:{}", path.display()),
            SourceSpec::Directory {
                path,
                looping: true,
            } => write!(f, "dir-loop:{}", path.display()),
            SourceSpec::V4l2 { device } => write!(f, "v4l2:{}", device),
        }
    }
}

/// Open the source described by `spec`
pub fn open_source(spec: &SourceSpec) -> SourceResult<Box<dyn FrameSource>> {
    match spec {
        SourceSpec::Directory { path, looping } => {
            Ok(Box::new(DirectorySource::open(path, *looping)?))
        }
        #[cfg(all(target_os = "linux", feature = "v4l2"))]
        SourceSpec::V4l2 { device } => Ok(Box::new(v4l2::V4l2Source::open(device)?)),
        #[cfg(not(all(target_os = "linux", feature = "v4l2")))]
        SourceSpec::V4l2 { device } => Err(SourceError::Fatal(format!(
            "{}: V4L2 support not compiled in",
            device
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_spec() {
        assert_eq!(
            "dir:/tmp/frames".parse::<SourceSpec>().unwrap(),
            SourceSpec::Directory {
                path: PathBuf::from("/tmp/frames"),
                looping: false
            }
        );
        assert_eq!(
            "/dev/video2".parse::<SourceSpec>().unwrap(),
            SourceSpec::V4l2 {
                device: "/dev/video2".into()
            }
        );
        assert!("rtsp://cam".parse::<SourceSpec>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        let spec = SourceSpec::Directory {
            path: PathBuf::from("/srv/replay"),
            looping: true,
        };
        assert_eq!(spec.to_string().parse::<SourceSpec>().unwrap(), spec);
    }
}
