//! Per-camera driver over a directory of camera folders

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use vxp_core::background::{BackgroundOutcome, ensure_background};
use vxp_core::calibration::{CalibrationSolver, PlanarSolver};
use vxp_core::capture::run_capture;
use vxp_core::{PipelineConfig, VxpError};

use crate::detections::DetectionSidecar;
use crate::error::IoError;
use crate::sequence::ImageSequence;
use crate::store::{FileBackgroundStore, JsonReportSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Background,
    Calibrate,
    All,
}

impl Stage {
    fn background(self) -> bool {
        matches!(self, Stage::Background | Stage::All)
    }

    fn calibrate(self) -> bool {
        matches!(self, Stage::Calibrate | Stage::All)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationStatus {
    /// A calibration report already existed; nothing was recomputed
    Cached,
    Created {
        views: usize,
        removed_frame: Option<usize>,
        avg_error: f64,
    },
}

#[derive(Debug)]
pub struct CameraRun {
    pub name: String,
    pub background: Option<BackgroundOutcome>,
    pub calibration: Option<CalibrationStatus>,
    /// First failure for this camera; later stages are skipped
    pub error: Option<VxpError>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub cameras: Vec<CameraRun>,
}

impl RunSummary {
    pub fn failed(&self) -> impl Iterator<Item = &CameraRun> {
        self.cameras.iter().filter(|c| c.error.is_some())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Camera directories under `data_root`, sorted by name
pub fn list_cameras(data_root: &Path) -> vxp_core::Result<Vec<PathBuf>> {
    if !data_root.is_dir() {
        return Err(IoError::FileDoesNotExist(data_root.to_path_buf()).into());
    }
    let mut cameras = Vec::new();
    for entry in fs::read_dir(data_root).map_err(IoError::from)? {
        let path = entry.map_err(IoError::from)?.path();
        if path.is_dir() {
            cameras.push(path);
        }
    }
    cameras.sort();
    Ok(cameras)
}

fn camera_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

pub fn run_background(config: &PipelineConfig, camera_dir: &Path) -> vxp_core::Result<BackgroundOutcome> {
    let mut store = FileBackgroundStore::new(camera_dir.join(&config.background_image));
    let mut rng = match config.background.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let video = camera_dir.join(&config.background_video);

    ensure_background(
        &mut store,
        || Ok(ImageSequence::open(&video)?),
        config.background.samples,
        &mut rng,
    )
}

pub fn run_calibration<S: CalibrationSolver + ?Sized>(
    config: &PipelineConfig,
    camera_dir: &Path,
    solver: &S,
) -> vxp_core::Result<CalibrationStatus> {
    let mut sink = JsonReportSink::new(camera_dir.join(&config.calibration_output));
    if sink.path().is_file() {
        info!("calibration located at {}, skipping", sink.path().display());
        return Ok(CalibrationStatus::Cached);
    }

    let mut source = ImageSequence::open(camera_dir.join(&config.calibration_video))?;
    let detections = camera_dir.join(&config.detections_file);
    let mut detector = DetectionSidecar::load_json(&detections)?;
    if detector.is_empty() {
        warn!("{} records no pattern detections", detections.display());
    } else {
        debug!("{} frames with recorded detections", detector.len());
    }
    let outcome = run_capture(&mut source, &mut detector, solver, &mut sink, &config.capture)?;

    let calibration = outcome.calibration;
    Ok(CalibrationStatus::Created {
        views: calibration.observations.len(),
        removed_frame: calibration.removed_frame,
        avg_error: calibration.result.avg_error,
    })
}

pub fn process_camera<S: CalibrationSolver + ?Sized>(
    config: &PipelineConfig,
    camera_dir: &Path,
    stage: Stage,
    solver: &S,
) -> CameraRun {
    let name = camera_name(camera_dir);
    let mut run = CameraRun {
        name,
        background: None,
        calibration: None,
        error: None,
    };

    if stage.background() {
        match run_background(config, camera_dir) {
            Ok(outcome) => run.background = Some(outcome),
            Err(e) => {
                error!("{}: background failed: {e}", run.name);
                run.error = Some(e);
                return run;
            }
        }
    }
    if stage.calibrate() {
        match run_calibration(config, camera_dir, solver) {
            Ok(status) => run.calibration = Some(status),
            Err(e) => {
                error!("{}: calibration failed: {e}", run.name);
                run.error = Some(e);
            }
        }
    }
    run
}

/// Run `stage` for every camera (or only `camera`). The configuration is
/// validated first; one camera failing does not stop the others.
pub fn process_cameras(
    config: &PipelineConfig,
    stage: Stage,
    camera: Option<&str>,
) -> vxp_core::Result<RunSummary> {
    config.validate()?;
    let mut cameras = list_cameras(&config.data_root)?;
    if let Some(only) = camera {
        cameras.retain(|dir| camera_name(dir) == only);
        if cameras.is_empty() {
            return Err(VxpError::SourceUnavailable(format!(
                "camera {only} not found under {}",
                config.data_root.display()
            )));
        }
    }

    let solver = PlanarSolver::default();
    let mut summary = RunSummary::default();
    for dir in cameras {
        info!("processing {}", dir.display());
        summary.cameras.push(process_camera(config, &dir, stage, &solver));
    }
    Ok(summary)
}
