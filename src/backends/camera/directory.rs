// SPDX-License-Identifier: GPL-3.0-only

//! Replay a directory of still images as a frame source

use super::{Frame, FrameSource, SourceResult};
use crate::constants::file_formats;
use crate::errors::SourceError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Frame source backed by image files, yielded in file name order
///
/// Useful for replaying recorded footage and for exercising the pipeline
/// without a camera. Without looping the source is exhausted after the last
/// file, which the session treats like an unplugged camera.
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    looping: bool,
    sequence: u64,
}

impl DirectorySource {
    pub fn open(dir: &Path, looping: bool) -> SourceResult<Self> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| SourceError::Fatal(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(file_formats::is_image_extension)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(SourceError::Fatal(format!(
                "{}: no image files to replay",
                dir.display()
            )));
        }

        info!(dir = %dir.display(), count = files.len(), looping, "Opened image directory source");

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            position: 0,
            looping,
            sequence: 0,
        })
    }

    /// Number of image files being replayed
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> SourceResult<Option<Frame>> {
        if self.position >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.position = 0;
        }

        let path = &self.files[self.position];
        self.position += 1;

        // A file that vanished or is corrupt only costs one frame
        let image = image::open(path)
            .map_err(|e| SourceError::Transient(format!("{}: {}", path.display(), e)))?;

        let frame = Frame::from_image(self.sequence, image);
        self.sequence += 1;
        debug!(path = %path.display(), sequence = frame.sequence, "Replayed frame");
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }
}
