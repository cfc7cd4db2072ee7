use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::coordinate::ViewPose;
use crate::error::Result;

/// Options forwarded to the calibration solver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverFlags {
    /// Keep `fx / fy` equal to the configured aspect ratio
    pub fix_aspect_ratio: bool,
    /// Keep the principal point at the image centre
    pub fix_principal_point: bool,
    /// Force `p1 = p2 = 0`
    pub zero_tangent_dist: bool,
    /// Force `k3 = 0`
    pub fix_k3: bool,
}

impl SolverFlags {
    /// Human-readable names of the enabled flags
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.fix_aspect_ratio {
            names.push("fix_aspect_ratio");
        }
        if self.fix_principal_point {
            names.push("fix_principal_point");
        }
        if self.zero_tangent_dist {
            names.push("zero_tangent_dist");
        }
        if self.fix_k3 {
            names.push("fix_k3");
        }
        names
    }

    pub fn with_fixed_k3(mut self) -> Self {
        self.fix_k3 = true;
        self
    }
}

/// One calibration problem: every view observes the same object grid
#[derive(Debug, Clone)]
pub struct SolverInput<'a> {
    pub image_points: &'a [Vec<Point2<f64>>],
    pub object_points: &'a [Point3<f64>],
    /// `(width, height)` in pixels
    pub image_size: (usize, usize),
    pub flags: SolverFlags,
    /// `fx / fy`, used with [`SolverFlags::fix_aspect_ratio`]
    pub aspect_ratio: f64,
    /// Grid point held fixed while the remaining object points are refined.
    /// `None` keeps the whole grid fixed.
    pub released_point: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    pub camera_matrix: Matrix3<f64>,
    /// `(k1, k2, p1, p2, k3, k4, k5, k6)`
    pub distortion: Vec<f64>,
    pub poses: Vec<ViewPose>,
    /// Root-mean-square reprojection error over all points
    pub rms: f64,
    /// Object grid after refinement (unchanged when no point is released)
    pub object_points: Vec<Point3<f64>>,
}

/// Nonlinear intrinsic calibration from planar views
pub trait CalibrationSolver: Send + Sync {
    fn solve(&self, input: &SolverInput<'_>) -> Result<SolverOutput>;
}
