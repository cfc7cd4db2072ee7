//! File-backed persistence of backgrounds and calibration reports

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use vxp_core::background::BackgroundStore;
use vxp_core::calibration::{CalibrationReport, ReportSink};
use vxp_core::source::Frame;

use crate::error::{IoError, Result};
use crate::raster::{write_atomic, write_png};

/// Background image stored as a PNG at a fixed path
#[derive(Debug, Clone)]
pub struct FileBackgroundStore {
    path: PathBuf,
}

impl FileBackgroundStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackgroundStore for FileBackgroundStore {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn save(&mut self, background: &Frame) -> vxp_core::Result<()> {
        write_png(&self.path, background)?;
        info!("background written to {}", self.path.display());
        Ok(())
    }
}

/// Calibration report stored as pretty-printed JSON
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonReportSink {
    fn write(&mut self, report: &CalibrationReport) -> vxp_core::Result<()> {
        let json = serde_json::to_string_pretty(report).map_err(IoError::from)?;
        write_atomic(&self.path, |tmp| Ok(fs::write(tmp, &json)?))?;
        info!("calibration report written to {}", self.path.display());
        Ok(())
    }
}

pub fn read_report(path: impl AsRef<Path>) -> Result<CalibrationReport> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::FileDoesNotExist(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::read_frame;
    use nalgebra::{Matrix3, Point2, Vector3};
    use ndarray::Array3;
    use tempfile::tempdir;
    use vxp_core::calibration::{
        CalibrationSetup, CalibrationSolver, ObservationSet, ReportOptions, SolverFlags,
        SolverInput, SolverOutput, calibrate_and_save,
    };
    use vxp_core::{PatternGeometry, PatternKind, ViewPose, VxpError};

    /// Solver whose distortion always contains a NaN
    struct NanSolver;

    impl CalibrationSolver for NanSolver {
        fn solve(&self, input: &SolverInput<'_>) -> vxp_core::Result<SolverOutput> {
            Ok(SolverOutput {
                camera_matrix: Matrix3::identity(),
                distortion: vec![f64::NAN, 0.0, 0.0, 0.0, 0.0],
                poses: vec![ViewPose::new(Vector3::zeros(), Vector3::z()); input.image_points.len()],
                rms: 0.5,
                object_points: input.object_points.to_vec(),
            })
        }
    }

    fn report() -> CalibrationReport {
        CalibrationReport {
            calibration_time: 1_700_000_000,
            nframes: 29,
            image_width: 1920,
            image_height: 1080,
            board_width: 8,
            board_height: 6,
            square_size: 115.0,
            aspect_ratio: None,
            flags: vec!["fix_k3".to_string()],
            camera_matrix: [[1400.0, 0.0, 960.0], [0.0, 1390.0, 540.0], [0.0, 0.0, 1.0]],
            distortion_coefficients: vec![-0.2, 0.05, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            avg_reprojection_error: 0.31,
            per_view_reprojection_errors: vec![0.3; 29],
            extrinsic_parameters: None,
            image_points: None,
            grid_points: Some(vec![[0.0, 0.0, 0.0]]),
        }
    }

    #[test]
    fn background_store_tracks_existence() {
        let dir = tempdir().unwrap();
        let mut store = FileBackgroundStore::new(dir.path().join("background.png"));
        assert!(!store.exists());

        let frame = Array3::from_elem((4, 5, 3), 12u8);
        store.save(&frame).unwrap();
        assert!(store.exists());
        assert_eq!(read_frame(store.path()).unwrap(), frame);
    }

    #[test]
    fn report_round_trips_through_json() {
        let dir = tempdir().unwrap();
        let mut sink = JsonReportSink::new(dir.path().join("calibration.json"));
        sink.write(&report()).unwrap();

        assert_eq!(read_report(sink.path()).unwrap(), report());
        let raw = fs::read_to_string(sink.path()).unwrap();
        assert!(!raw.contains("image_points"));
    }

    #[test]
    fn rejected_calibration_leaves_previous_report_untouched() {
        let dir = tempdir().unwrap();
        let mut sink = JsonReportSink::new(dir.path().join("calibration.json"));
        sink.write(&report()).unwrap();
        let before = fs::read(sink.path()).unwrap();

        let setup = CalibrationSetup {
            image_size: (640, 480),
            geometry: PatternGeometry::new(PatternKind::Chessboard, 3, 2, 1.0).unwrap(),
            flags: SolverFlags::default(),
            aspect_ratio: 1.0,
            release_object: false,
        };
        let observations: Vec<ObservationSet> = (0..4)
            .map(|i| ObservationSet {
                frame_index: i * 50,
                image_points: vec![Point2::new(10.0, 20.0); 6],
            })
            .collect();

        let res = calibrate_and_save(&NanSolver, &setup, ReportOptions::default(), observations, &mut sink);
        assert!(matches!(res, Err(VxpError::CalibrationFailed(_))));
        assert_eq!(fs::read(sink.path()).unwrap(), before);
        assert!(!dir.path().join("calibration.json.tmp").exists());
    }

    #[test]
    fn rewrite_replaces_whole_report() {
        let dir = tempdir().unwrap();
        let mut sink = JsonReportSink::new(dir.path().join("calibration.json"));
        sink.write(&report()).unwrap();

        let mut second = report();
        second.nframes = 30;
        second.grid_points = None;
        sink.write(&second).unwrap();
        assert_eq!(read_report(sink.path()).unwrap(), second);
    }
}
