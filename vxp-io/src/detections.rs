//! Pattern detections produced ahead of time by an external detector

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use vxp_core::pattern::PatternGeometry;
use vxp_core::source::{Frame, PatternDetector};

use crate::error::{IoError, Result};

/// JSON map from frame index to the detected image points of that frame,
/// in object-point order. Frames without an entry have no detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionSidecar {
    frames: BTreeMap<usize, Vec<[f64; 2]>>,
}

impl DetectionSidecar {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IoError::FileDoesNotExist(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn insert(&mut self, frame_index: usize, points: &[Point2<f64>]) {
        self.frames
            .insert(frame_index, points.iter().map(|p| [p.x, p.y]).collect());
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl PatternDetector for DetectionSidecar {
    fn detect(
        &mut self,
        frame_index: usize,
        _frame: &Frame,
        geometry: &PatternGeometry,
    ) -> vxp_core::Result<Option<Vec<Point2<f64>>>> {
        let Some(points) = self.frames.get(&frame_index) else {
            return Ok(None);
        };
        if points.len() != geometry.point_count() {
            debug!(
                "frame {frame_index}: {} points listed, pattern has {}",
                points.len(),
                geometry.point_count()
            );
            return Ok(None);
        }
        Ok(Some(points.iter().map(|&[x, y]| Point2::new(x, y)).collect()))
    }
}
