//! Pipeline configuration record

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::background::DEFAULT_SAMPLES;
use crate::calibration::{CalibrationSetup, ReportOptions, SolverFlags};
use crate::error::{Result, VxpError};
use crate::pattern::{PatternGeometry, PatternKind};

fn default_background_video() -> String {
    "background".to_string()
}

fn default_background_image() -> String {
    "background.png".to_string()
}

fn default_calibration_video() -> String {
    "calibration".to_string()
}

fn default_calibration_output() -> String {
    "calibration.json".to_string()
}

fn default_detections_file() -> String {
    "detections.json".to_string()
}

/// Per-run settings: where the camera directories live and what each stage
/// reads and writes inside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding one sub-directory per camera
    pub data_root: PathBuf,
    #[serde(default = "default_background_video")]
    pub background_video: String,
    #[serde(default = "default_background_image")]
    pub background_image: String,
    #[serde(default = "default_calibration_video")]
    pub calibration_video: String,
    #[serde(default = "default_calibration_output")]
    pub calibration_output: String,
    /// Pattern detections for the calibration video, produced by an external detector
    #[serde(default = "default_detections_file")]
    pub detections_file: String,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl PipelineConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            background_video: default_background_video(),
            background_image: default_background_image(),
            calibration_video: default_calibration_video(),
            calibration_output: default_calibration_output(),
            detections_file: default_detections_file(),
            background: BackgroundConfig::default(),
            capture: CaptureConfig::default(),
        }
    }

    /// Check every setting before any file is touched
    pub fn validate(&self) -> Result<()> {
        if self.data_root.as_os_str().is_empty() {
            return Err(VxpError::InvalidConfig("data_root is empty".to_string()));
        }
        for (name, value) in [
            ("background_video", &self.background_video),
            ("background_image", &self.background_image),
            ("calibration_video", &self.calibration_video),
            ("calibration_output", &self.calibration_output),
            ("detections_file", &self.detections_file),
        ] {
            if value.is_empty() {
                return Err(VxpError::InvalidConfig(format!("{name} is empty")));
            }
        }
        self.background.validate()?;
        self.capture.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Frames drawn per background video
    pub samples: usize,
    /// RNG seed for frame sampling; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            seed: None,
        }
    }
}

impl BackgroundConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(VxpError::InvalidConfig(
                "background.samples must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub pattern: PatternKind,
    /// Points per row
    pub board_width: usize,
    /// Points per column
    pub board_height: usize,
    pub square_size: f64,
    /// Inspect every `sample_every`-th frame
    pub sample_every: usize,
    /// Observation sets to collect before calibrating
    pub target_views: usize,
    /// `fx / fy` when the aspect ratio is fixed
    pub aspect_ratio: f64,
    pub release_object: bool,
    pub flags: SolverFlags,
    pub write_extrinsics: bool,
    pub write_points: bool,
    pub write_grid: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            pattern: PatternKind::Chessboard,
            board_width: 8,
            board_height: 6,
            square_size: 115.0,
            sample_every: 50,
            target_views: 30,
            aspect_ratio: 1.0,
            release_object: false,
            flags: SolverFlags::default(),
            write_extrinsics: false,
            write_points: true,
            write_grid: true,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        let geometry = self.geometry()?;
        if self.sample_every == 0 {
            return Err(VxpError::InvalidConfig(
                "capture.sample_every must be positive".to_string(),
            ));
        }
        if self.target_views <= 3 {
            return Err(VxpError::InvalidConfig(format!(
                "capture.target_views must be greater than 3, got {}",
                self.target_views
            )));
        }
        if !(self.aspect_ratio.is_finite() && self.aspect_ratio > 0.0) {
            return Err(VxpError::InvalidConfig(format!(
                "capture.aspect_ratio must be positive, got {}",
                self.aspect_ratio
            )));
        }
        if self.release_object {
            // the end of the first row must differ from the gauge points 0 and n - 1
            let n = geometry.point_count();
            let released = geometry.cols() - 1;
            if n < 3 || !(1..n - 1).contains(&released) {
                return Err(VxpError::InvalidConfig(format!(
                    "capture.release_object needs at least 2 rows and 2 columns, got {}x{}",
                    geometry.cols(),
                    geometry.rows()
                )));
            }
        }
        Ok(())
    }

    pub fn geometry(&self) -> Result<PatternGeometry> {
        PatternGeometry::new(
            self.pattern,
            self.board_width,
            self.board_height,
            self.square_size,
        )
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            write_extrinsics: self.write_extrinsics,
            write_points: self.write_points,
            write_grid: self.write_grid,
        }
    }

    /// Calibration inputs for frames of the given `(width, height)`
    pub fn setup(&self, image_size: (usize, usize)) -> Result<CalibrationSetup> {
        Ok(CalibrationSetup {
            image_size,
            geometry: self.geometry()?,
            flags: self.flags,
            aspect_ratio: self.aspect_ratio,
            release_object: self.release_object,
        })
    }
}
