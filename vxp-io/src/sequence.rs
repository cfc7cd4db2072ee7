use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use vxp_core::source::{Frame, FrameSource};

use crate::error::{IoError, Result};
use crate::raster::{is_frame_file, read_frame};

/// A video stored as a directory of still frames, ordered by file name
#[derive(Debug, Clone)]
pub struct ImageSequence {
    frames: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequence {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(IoError::FileDoesNotExist(dir.to_path_buf()));
        }

        let mut frames = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if is_frame_file(&path) {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(IoError::EmptySequence(dir.to_path_buf()));
        }
        frames.sort();
        debug!("opened {} with {} frames", dir.display(), frames.len());

        Ok(Self { frames, cursor: 0 })
    }
}

impl FrameSource for ImageSequence {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn seek(&mut self, index: usize) -> vxp_core::Result<()> {
        self.cursor = index;
        Ok(())
    }

    fn next_frame(&mut self) -> vxp_core::Result<Option<Frame>> {
        let Some(path) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        match read_frame(path) {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => {
                warn!("failed to decode {}: {e}", path.display());
                Ok(None)
            }
        }
    }
}
