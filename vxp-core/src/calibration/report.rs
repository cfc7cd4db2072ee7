//! Persisted calibration record

use std::time::SystemTime;

use log::info;
use serde::{Deserialize, Serialize};

use super::optimizer::{CalibrationOutcome, CalibrationSetup, ObservationSet, calibrate_leave_one_out};
use super::solver::CalibrationSolver;
use crate::error::Result;

/// Which optional sections go into the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub write_extrinsics: bool,
    pub write_points: bool,
    pub write_grid: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            write_extrinsics: false,
            write_points: true,
            write_grid: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Seconds since the UNIX epoch
    pub calibration_time: u64,
    /// Number of observation sets the calibration was computed from
    pub nframes: usize,
    pub image_width: usize,
    pub image_height: usize,
    pub board_width: usize,
    pub board_height: usize,
    pub square_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    pub flags: Vec<String>,
    /// Row-major
    pub camera_matrix: [[f64; 3]; 3],
    pub distortion_coefficients: Vec<f64>,
    pub avg_reprojection_error: f64,
    pub per_view_reprojection_errors: Vec<f64>,
    /// `[rx, ry, rz, tx, ty, tz]` per view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrinsic_parameters: Option<Vec<[f64; 6]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_points: Option<Vec<Vec<[f64; 2]>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_points: Option<Vec<[f64; 3]>>,
}

impl CalibrationReport {
    pub fn build(
        outcome: &CalibrationOutcome,
        setup: &CalibrationSetup,
        options: ReportOptions,
        calibration_time: u64,
    ) -> Self {
        let result = &outcome.result;
        let (image_width, image_height) = setup.image_size;
        let flags = setup.flags.with_fixed_k3();
        let k = &result.camera_matrix;

        Self {
            calibration_time,
            nframes: outcome.observations.len(),
            image_width,
            image_height,
            board_width: setup.geometry.cols(),
            board_height: setup.geometry.rows(),
            square_size: setup.geometry.spacing(),
            aspect_ratio: flags.fix_aspect_ratio.then_some(setup.aspect_ratio),
            flags: flags.names().into_iter().map(String::from).collect(),
            camera_matrix: [
                [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
                [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
                [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
            ],
            distortion_coefficients: result.distortion.clone(),
            avg_reprojection_error: result.avg_error,
            per_view_reprojection_errors: result.per_view_errors.clone(),
            extrinsic_parameters: options
                .write_extrinsics
                .then(|| result.poses.iter().map(|p| p.as_row()).collect()),
            image_points: options.write_points.then(|| {
                outcome
                    .observations
                    .iter()
                    .map(|o| o.image_points.iter().map(|p| [p.x, p.y]).collect())
                    .collect()
            }),
            grid_points: options.write_grid.then(|| {
                result
                    .object_points
                    .iter()
                    .map(|p| [p.x, p.y, p.z])
                    .collect()
            }),
        }
    }
}

/// Durable destination of calibration reports. A write either stores the
/// whole report or leaves any previous one untouched.
pub trait ReportSink {
    fn write(&mut self, report: &CalibrationReport) -> Result<()>;
}

/// Seconds since the UNIX epoch; zero if the clock is before it
pub fn unix_time_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Run the leave-one-out calibration and persist the report. Nothing is
/// written when calibration or validation fails.
pub fn calibrate_and_save<S, K>(
    solver: &S,
    setup: &CalibrationSetup,
    options: ReportOptions,
    observations: Vec<ObservationSet>,
    sink: &mut K,
) -> Result<CalibrationOutcome>
where
    S: CalibrationSolver + ?Sized,
    K: ReportSink + ?Sized,
{
    let outcome = calibrate_leave_one_out(solver, setup, observations)?;
    let report = CalibrationReport::build(&outcome, setup, options, unix_time_now());
    sink.write(&report)?;
    info!(
        "calibration saved: {} views, avg reprojection error {:.4}",
        report.nframes, report.avg_reprojection_error
    );
    Ok(outcome)
}
