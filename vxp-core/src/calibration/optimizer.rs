//! Leave-one-out calibration refinement

use log::{debug, info, warn};
use nalgebra::{Matrix3, Point2, Point3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::reprojection::reprojection_errors;
use super::solver::{CalibrationSolver, SolverFlags, SolverInput, SolverOutput};
use crate::camera::PinholeCamera;
use crate::coordinate::ViewPose;
use crate::error::{Result, VxpError};
use crate::pattern::PatternGeometry;

/// Largest magnitude accepted for any intrinsic or distortion entry
pub const PARAMETER_LIMIT: f64 = 1e10;

/// Detected image points of one calibration target instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSet {
    /// Index of the frame the target was detected in
    pub frame_index: usize,
    pub image_points: Vec<Point2<f64>>,
}

/// Fixed inputs of one calibration run
#[derive(Debug, Clone)]
pub struct CalibrationSetup {
    /// `(width, height)` in pixels
    pub image_size: (usize, usize),
    pub geometry: PatternGeometry,
    pub flags: SolverFlags,
    pub aspect_ratio: f64,
    /// Refine the object grid jointly with the camera
    pub release_object: bool,
}

impl CalibrationSetup {
    /// Grid point held fixed when the object grid is released: the last
    /// point of the first row.
    pub fn released_point(&self) -> Option<usize> {
        if !self.release_object {
            return None;
        }
        self.geometry.cols().checked_sub(1)
    }

    /// Initial object grid. With a released grid, the fixed end of the first
    /// row sits exactly one grid width from the first point.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let mut points = self.geometry.object_points();
        if let Some(fixed) = self.released_point() {
            let x = points.first().map(|p| p.x + self.geometry.grid_width());
            if let (Some(x), Some(point)) = (x, points.get_mut(fixed)) {
                point.x = x;
            }
        }
        points
    }

    fn solve<S: CalibrationSolver + ?Sized>(
        &self,
        solver: &S,
        object_points: &[Point3<f64>],
        image_points: &[Vec<Point2<f64>>],
    ) -> Result<SolverOutput> {
        let input = SolverInput {
            image_points,
            object_points,
            image_size: self.image_size,
            flags: self.flags.with_fixed_k3(),
            aspect_ratio: self.aspect_ratio,
            released_point: self.released_point(),
        };
        solver.solve(&input)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub camera_matrix: Matrix3<f64>,
    pub distortion: Vec<f64>,
    /// One pose per retained observation set
    pub poses: Vec<ViewPose>,
    /// Object grid used for the committed solve
    pub object_points: Vec<Point3<f64>>,
    /// RMS reprojection error per retained view
    pub per_view_errors: Vec<f64>,
    /// RMS reprojection error over all points of all retained views
    pub avg_error: f64,
    /// RMS reported by the solver for the committed solve
    pub solver_rms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    pub result: CalibrationResult,
    /// Observation sets the result was computed from
    pub observations: Vec<ObservationSet>,
    /// Position, in the input collection, of the dropped observation set
    pub removed: Option<usize>,
    /// Frame index of the dropped observation set
    pub removed_frame: Option<usize>,
    pub baseline_rms: f64,
}

/// Index of the candidate to drop: lowest finite RMS strictly below the
/// baseline, ties to the lowest index. `None` entries are failed solves.
pub fn select_removal(baseline_rms: f64, candidates: &[Option<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, rms) in candidates.iter().enumerate() {
        let Some(rms) = *rms else { continue };
        if !rms.is_finite() || rms >= baseline_rms {
            continue;
        }
        if best.is_none_or(|(_, b)| rms < b) {
            best = Some((i, rms));
        }
    }
    best.map(|(i, _)| i)
}

/// Reject camera parameters with non-finite or out-of-range entries
pub fn validate_parameters(camera_matrix: &Matrix3<f64>, distortion: &[f64]) -> Result<()> {
    let in_range = |v: &f64| v.is_finite() && v.abs() < PARAMETER_LIMIT;
    if !camera_matrix.iter().all(in_range) {
        return Err(VxpError::CalibrationFailed(
            "camera matrix has non-finite or out-of-range entries".to_string(),
        ));
    }
    if !distortion.iter().all(in_range) {
        return Err(VxpError::CalibrationFailed(
            "distortion coefficients have non-finite or out-of-range entries".to_string(),
        ));
    }
    Ok(())
}

/// Calibrate from every observation set, then retry once with each set left
/// out and keep the best single removal if it lowers the RMS error.
pub fn calibrate_leave_one_out<S: CalibrationSolver + ?Sized>(
    solver: &S,
    setup: &CalibrationSetup,
    mut observations: Vec<ObservationSet>,
) -> Result<CalibrationOutcome> {
    if observations.is_empty() {
        return Err(VxpError::InsufficientData(
            "no observation sets to calibrate from".to_string(),
        ));
    }

    let object_points = setup.object_points();
    let image_points: Vec<Vec<Point2<f64>>> = observations
        .iter()
        .map(|o| o.image_points.clone())
        .collect();

    let baseline = setup
        .solve(solver, &object_points, &image_points)
        .map_err(|e| match e {
            VxpError::Numerical(msg) => VxpError::CalibrationFailed(msg),
            other => other,
        })?;
    if !baseline.rms.is_finite() {
        return Err(VxpError::CalibrationFailed(
            "baseline solve produced a non-finite error".to_string(),
        ));
    }
    info!(
        "baseline calibration over {} views: rms {:.4}",
        observations.len(),
        baseline.rms
    );

    let candidates: Vec<Option<SolverOutput>> = (0..image_points.len())
        .into_par_iter()
        .map(|skip| {
            let subset: Vec<Vec<Point2<f64>>> = image_points
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, v)| v.clone())
                .collect();
            match setup.solve(solver, &object_points, &subset) {
                Ok(out) => {
                    debug!("without view {skip}: rms {:.4}", out.rms);
                    Some(out)
                }
                Err(e) => {
                    debug!("without view {skip}: solve failed: {e}");
                    None
                }
            }
        })
        .collect();

    let scores: Vec<Option<f64>> = candidates
        .iter()
        .map(|c| c.as_ref().map(|out| out.rms))
        .collect();
    let baseline_rms = baseline.rms;
    let committed = select_removal(baseline_rms, &scores)
        .and_then(|i| candidates.into_iter().nth(i).flatten().map(|out| (i, out)));

    let (removed, removed_frame, output) = match committed {
        Some((i, out)) => {
            let dropped = observations.remove(i);
            info!(
                "dropping observation from frame {}: rms {:.4} -> {:.4}",
                dropped.frame_index, baseline_rms, out.rms
            );
            (Some(i), Some(dropped.frame_index), out)
        }
        None => (None, None, baseline),
    };

    if let Err(e) = validate_parameters(&output.camera_matrix, &output.distortion) {
        warn!("rejecting calibration: {e}");
        return Err(e);
    }

    let camera = PinholeCamera::from_parts(&output.camera_matrix, &output.distortion)
        .map_err(|e| VxpError::CalibrationFailed(e.to_string()))?;
    let retained: Vec<Vec<Point2<f64>>> = observations
        .iter()
        .map(|o| o.image_points.clone())
        .collect();
    let errors = reprojection_errors(&camera, &output.object_points, &retained, &output.poses)
        .map_err(|e| VxpError::CalibrationFailed(format!("reprojection failed: {e}")))?;

    Ok(CalibrationOutcome {
        result: CalibrationResult {
            camera_matrix: output.camera_matrix,
            distortion: output.distortion,
            poses: output.poses,
            object_points: output.object_points,
            per_view_errors: errors.per_view,
            avg_error: errors.total,
            solver_rms: output.rms,
        },
        observations,
        removed,
        removed_frame,
        baseline_rms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::PlanarSolver;
    use crate::camera::CameraModel;
    use crate::pattern::PatternKind;
    use nalgebra::Vector3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn geometry() -> PatternGeometry {
        PatternGeometry::new(PatternKind::Chessboard, 6, 5, 0.04).unwrap()
    }

    fn setup() -> CalibrationSetup {
        CalibrationSetup {
            image_size: (640, 480),
            geometry: geometry(),
            flags: SolverFlags::default(),
            aspect_ratio: 1.0,
            release_object: false,
        }
    }

    fn synthetic_observations() -> Vec<ObservationSet> {
        let kmtx = Matrix3::new(700.0, 0.0, 318.0, 0.0, 690.0, 245.0, 0.0, 0.0, 1.0);
        let cam = PinholeCamera::from_parts(&kmtx, &[-0.08, 0.02, 0.0, 0.0]).unwrap();
        let grid = geometry().object_points();
        let poses = [
            ((0.2, -0.1, 0.0), (-0.1, -0.08, 0.6)),
            ((-0.25, 0.15, 0.05), (-0.12, -0.06, 0.7)),
            ((0.1, 0.3, -0.1), (-0.09, -0.1, 0.65)),
            ((-0.15, -0.3, 0.1), (-0.1, -0.07, 0.55)),
            ((0.35, 0.1, 0.0), (-0.11, -0.09, 0.75)),
            ((0.0, -0.35, -0.05), (-0.08, -0.05, 0.6)),
            ((-0.3, -0.05, 0.15), (-0.1, -0.1, 0.68)),
        ];

        poses
            .iter()
            .enumerate()
            .map(|(i, &((rx, ry, rz), (tx, ty, tz)))| {
                let pose = ViewPose::new(Vector3::new(rx, ry, rz), Vector3::new(tx, ty, tz));
                let image_points = grid
                    .iter()
                    .map(|p| {
                        let (u, v) = cam.project(&pose.transform_point(p)).unwrap();
                        Point2::new(u, v)
                    })
                    .collect();
                ObservationSet {
                    frame_index: i * 50,
                    image_points,
                }
            })
            .collect()
    }

    /// Returns a fixed camera and a scripted RMS; optionally poisons the distortion
    struct ScriptedSolver {
        poison: bool,
        calls: AtomicUsize,
    }

    impl CalibrationSolver for ScriptedSolver {
        fn solve(&self, input: &SolverInput<'_>) -> Result<SolverOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut distortion = vec![0.0; 8];
            if self.poison {
                distortion[1] = f64::NAN;
            }
            Ok(SolverOutput {
                camera_matrix: Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0),
                distortion,
                poses: vec![ViewPose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0)); input.image_points.len()],
                rms: 1.0,
                object_points: input.object_points.to_vec(),
            })
        }
    }

    #[test]
    fn selection_prefers_lowest_improvement() {
        let scores = [Some(0.9), Some(0.4), Some(0.7)];
        assert_eq!(select_removal(1.0, &scores), Some(1));
    }

    #[test]
    fn selection_breaks_ties_by_lowest_index() {
        let scores = [Some(0.8), Some(0.5), Some(0.6), Some(0.5)];
        assert_eq!(select_removal(1.0, &scores), Some(1));
    }

    #[test]
    fn selection_requires_strict_improvement() {
        assert_eq!(select_removal(1.0, &[Some(1.0), Some(1.2)]), None);
        assert_eq!(select_removal(1.0, &[]), None);
    }

    #[test]
    fn selection_ignores_failed_and_non_finite_candidates() {
        let scores = [None, Some(f64::NAN), Some(0.9), Some(f64::NEG_INFINITY)];
        assert_eq!(select_removal(1.0, &scores), Some(2));
    }

    #[test]
    fn validation_rejects_non_finite_and_huge_values() {
        let k = Matrix3::identity();
        assert!(validate_parameters(&k, &[0.1, -0.2, 0.0, 0.0, 0.0]).is_ok());
        assert!(matches!(
            validate_parameters(&k, &[0.1, f64::INFINITY]),
            Err(VxpError::CalibrationFailed(_))
        ));
        let mut bad = k;
        bad[(0, 2)] = 1e12;
        assert!(matches!(
            validate_parameters(&bad, &[]),
            Err(VxpError::CalibrationFailed(_))
        ));
    }

    #[test]
    fn corrupted_view_is_removed_and_error_drops() {
        let mut observations = synthetic_observations();
        for (j, p) in observations[3].image_points.iter_mut().enumerate() {
            let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
            p.x += 3.0 * sign;
            p.y -= 2.0 * sign;
        }
        let m = observations.len();

        let outcome = calibrate_leave_one_out(&PlanarSolver::default(), &setup(), observations).unwrap();
        assert_eq!(outcome.removed, Some(3));
        assert_eq!(outcome.removed_frame, Some(150));
        assert_eq!(outcome.observations.len(), m - 1);
        assert!(outcome.observations.iter().all(|o| o.frame_index != 150));
        assert!(outcome.result.solver_rms <= outcome.baseline_rms);
        assert!(outcome.result.avg_error <= outcome.baseline_rms);
        assert!(outcome.result.avg_error < 1e-3);
        assert_eq!(outcome.result.poses.len(), m - 1);
        assert_eq!(outcome.result.per_view_errors.len(), m - 1);
    }

    #[test]
    fn clean_views_keep_at_least_m_minus_one() {
        let observations = synthetic_observations();
        let m = observations.len();
        let outcome = calibrate_leave_one_out(&PlanarSolver::default(), &setup(), observations).unwrap();
        assert!(outcome.observations.len() >= m - 1);
        assert!(outcome.result.solver_rms <= outcome.baseline_rms);
        assert!(outcome.result.avg_error < 1e-3);
    }

    #[test]
    fn no_improvement_keeps_every_view() {
        let solver = ScriptedSolver {
            poison: false,
            calls: AtomicUsize::new(0),
        };
        let mut observations = synthetic_observations();
        observations.truncate(4);

        let outcome = calibrate_leave_one_out(&solver, &setup(), observations).unwrap();
        assert_eq!(outcome.removed, None);
        assert_eq!(outcome.observations.len(), 4);
        assert_eq!(outcome.baseline_rms, 1.0);
        // baseline plus one solve per candidate
        assert_eq!(solver.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn non_finite_distortion_is_a_calibration_failure() {
        let solver = ScriptedSolver {
            poison: true,
            calls: AtomicUsize::new(0),
        };
        let res = calibrate_leave_one_out(&solver, &setup(), synthetic_observations());
        assert!(matches!(res, Err(VxpError::CalibrationFailed(_))));
    }

    #[test]
    fn empty_collection_is_insufficient_data() {
        let res = calibrate_leave_one_out(&PlanarSolver::default(), &setup(), Vec::new());
        assert!(matches!(res, Err(VxpError::InsufficientData(_))));
    }

    #[test]
    fn released_point_is_end_of_first_row() {
        let mut s = setup();
        assert_eq!(s.released_point(), None);
        s.release_object = true;
        assert_eq!(s.released_point(), Some(5));
    }

    #[test]
    fn released_grid_anchors_first_row_width() {
        let mut s = setup();
        s.release_object = true;
        let points = s.object_points();
        assert_eq!(points.len(), 30);
        assert_eq!(points[5].x - points[0].x, s.geometry.grid_width());
        assert_eq!(points, s.geometry.object_points());
    }
}
