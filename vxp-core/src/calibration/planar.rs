//! Bundled planar-target calibration solver.
//!
//! Linear initialisation (per-view homographies, closed-form intrinsics,
//! homography pose decomposition) followed by a joint Levenberg-Marquardt
//! refinement of intrinsics, distortion, view poses and optionally the
//! object grid.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{DMatrix, DVector, Dyn, Matrix3, Point2, Point3, SVector, Vector3, storage::Owned};

use super::solver::{CalibrationSolver, SolverFlags, SolverInput, SolverOutput};
use crate::camera::{CameraModel, PinholeCamera};
use crate::coordinate::ViewPose;
use crate::error::{ProjectionError, Result, VxpError};

/// `fx fy cx cy k1 k2 p1 p2 k3`
const INTRINSIC_LEN: usize = 9;
const POSE_LEN: usize = 6;
const FD_STEP: f64 = 1e-6;
const BEHIND_CAMERA_RESIDUAL: f64 = 1e6;

#[derive(Debug, Clone, Copy)]
pub struct PlanarSolver {
    /// Levenberg-Marquardt evaluation budget, in multiples of `(params + 1)`
    pub patience: usize,
}

impl Default for PlanarSolver {
    fn default() -> Self {
        Self { patience: 100 }
    }
}

impl CalibrationSolver for PlanarSolver {
    fn solve(&self, input: &SolverInput<'_>) -> Result<SolverOutput> {
        let views = input.image_points.len();
        let n_points = input.object_points.len();
        if views < 3 {
            return Err(VxpError::InsufficientData(format!(
                "planar calibration needs at least 3 views, got {views}"
            )));
        }
        if n_points < 4 {
            return Err(VxpError::InsufficientData(format!(
                "planar calibration needs at least 4 grid points, got {n_points}"
            )));
        }
        if let Some(view) = input.image_points.iter().find(|v| v.len() != n_points) {
            return Err(ProjectionError::PointCountMismatch {
                expected: n_points,
                actual: view.len(),
            }
            .into());
        }
        if input.object_points.iter().any(|p| p.z.abs() > 1e-9) {
            return Err(VxpError::InvalidInput(
                "object grid must lie on the Z = 0 plane".to_string(),
            ));
        }
        if let Some(fixed) = input.released_point {
            if fixed == 0 || fixed >= n_points - 1 {
                return Err(VxpError::InvalidInput(format!(
                    "released grid point index {fixed} must lie in [1, {})",
                    n_points - 1
                )));
            }
        }

        let plane: Vec<Point2<f64>> = input
            .object_points
            .iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect();
        let homographies = input
            .image_points
            .iter()
            .map(|image| estimate_homography(&plane, image))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| VxpError::Numerical("homography estimation failed".to_string()))?;

        let [mut fx, fy, mut cx, mut cy] = intrinsics_from_homographies(&homographies)?;
        let (width, height) = input.image_size;
        if input.flags.fix_principal_point {
            cx = (width as f64 - 1.0) * 0.5;
            cy = (height as f64 - 1.0) * 0.5;
        }
        if input.flags.fix_aspect_ratio {
            fx = input.aspect_ratio * fy;
        }
        let kmtx = Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);
        let poses = homographies
            .iter()
            .map(|h| pose_from_homography(&kmtx, h))
            .collect::<Result<Vec<_>>>()?;

        let base = [fx, fy, cx, cy, 0.0, 0.0, 0.0, 0.0, 0.0];
        let layout = ParamLayout::new(base, input, views, n_points);
        let problem = PlanarProblem {
            input,
            layout: &layout,
            params: layout.pack(&base, &poses, input.object_points),
        };

        let (problem, report) = LevenbergMarquardt::new()
            .with_patience(self.patience.max(1))
            .minimize(problem);
        debug!(
            "planar refinement: {views} views, {} params, {} evaluations, cost {:.6e}, {:?}",
            layout.len(),
            report.number_of_evaluations,
            report.objective_function,
            report.termination
        );

        let x = &problem.params;
        let camera = layout
            .camera(x)
            .ok_or_else(|| VxpError::Numerical("invalid refined distortion".to_string()))?;
        let residuals = problem
            .residuals_at(x)
            .ok_or_else(|| VxpError::Numerical("residual evaluation failed".to_string()))?;
        let rms = (residuals.norm_squared() / (views * n_points) as f64).sqrt();

        Ok(SolverOutput {
            camera_matrix: camera.camera_matrix(),
            distortion: camera.distortion_coefficients().to_vec(),
            poses: (0..views).map(|v| layout.pose(x, v)).collect(),
            rms,
            object_points: layout.grid(x, input.object_points),
        })
    }
}

/// Mapping between the packed parameter vector and the model.
///
/// Layout: free intrinsics, then one `[rvec, tvec]` block per view, then
/// `[x, y, z]` for every released grid point.
struct ParamLayout {
    base: [f64; INTRINSIC_LEN],
    free_intrinsics: Vec<usize>,
    aspect_ratio: Option<f64>,
    views: usize,
    free_points: Vec<usize>,
}

impl ParamLayout {
    fn new(base: [f64; INTRINSIC_LEN], input: &SolverInput<'_>, views: usize, n_points: usize) -> Self {
        let SolverFlags {
            fix_aspect_ratio,
            fix_principal_point,
            zero_tangent_dist,
            fix_k3,
        } = input.flags;

        let free_intrinsics = (0..INTRINSIC_LEN)
            .filter(|&i| match i {
                0 => !fix_aspect_ratio,
                2 | 3 => !fix_principal_point,
                6 | 7 => !zero_tangent_dist,
                8 => !fix_k3,
                _ => true,
            })
            .collect();

        let free_points = match input.released_point {
            Some(fixed) => (1..n_points - 1).filter(|&i| i != fixed).collect(),
            None => Vec::new(),
        };

        Self {
            base,
            free_intrinsics,
            aspect_ratio: fix_aspect_ratio.then_some(input.aspect_ratio),
            views,
            free_points,
        }
    }

    fn len(&self) -> usize {
        self.free_intrinsics.len() + self.views * POSE_LEN + self.free_points.len() * 3
    }

    fn pose_offset(&self, view: usize) -> usize {
        self.free_intrinsics.len() + view * POSE_LEN
    }

    fn grid_offset(&self) -> usize {
        self.pose_offset(self.views)
    }

    /// View whose pose block contains parameter `k`
    fn pose_view(&self, k: usize) -> Option<usize> {
        let start = self.pose_offset(0);
        (start..self.grid_offset())
            .contains(&k)
            .then(|| (k - start) / POSE_LEN)
    }

    fn pack(&self, intr: &[f64; INTRINSIC_LEN], poses: &[ViewPose], grid: &[Point3<f64>]) -> DVector<f64> {
        let mut x = DVector::zeros(self.len());
        for (k, &i) in self.free_intrinsics.iter().enumerate() {
            x[k] = intr[i];
        }
        for (v, pose) in poses.iter().enumerate() {
            let off = self.pose_offset(v);
            x.rows_mut(off, POSE_LEN).copy_from_slice(&pose.as_row());
        }
        let off = self.grid_offset();
        for (k, &i) in self.free_points.iter().enumerate() {
            x.rows_mut(off + 3 * k, 3).copy_from(&grid[i].coords);
        }
        x
    }

    fn intrinsics(&self, x: &DVector<f64>) -> [f64; INTRINSIC_LEN] {
        let mut intr = self.base;
        for (k, &i) in self.free_intrinsics.iter().enumerate() {
            intr[i] = x[k];
        }
        if let Some(aspect) = self.aspect_ratio {
            intr[0] = aspect * intr[1];
        }
        intr
    }

    fn camera(&self, x: &DVector<f64>) -> Option<PinholeCamera> {
        let [fx, fy, cx, cy, k1, k2, p1, p2, k3] = self.intrinsics(x);
        let kmtx = Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);
        PinholeCamera::from_parts(&kmtx, &[k1, k2, p1, p2, k3, 0.0, 0.0, 0.0]).ok()
    }

    fn pose(&self, x: &DVector<f64>, view: usize) -> ViewPose {
        let off = self.pose_offset(view);
        ViewPose::from_row(&std::array::from_fn(|k| x[off + k]))
    }

    fn grid(&self, x: &DVector<f64>, base: &[Point3<f64>]) -> Vec<Point3<f64>> {
        let mut grid = base.to_vec();
        let off = self.grid_offset();
        for (k, &i) in self.free_points.iter().enumerate() {
            let o = off + 3 * k;
            grid[i] = Point3::new(x[o], x[o + 1], x[o + 2]);
        }
        grid
    }
}

struct PlanarProblem<'a> {
    input: &'a SolverInput<'a>,
    layout: &'a ParamLayout,
    params: DVector<f64>,
}

impl PlanarProblem<'_> {
    fn view_residuals(
        camera: &PinholeCamera,
        pose: &ViewPose,
        grid: &[Point3<f64>],
        observed: &[Point2<f64>],
        out: &mut [f64],
    ) {
        for (j, (object, image)) in grid.iter().zip(observed).enumerate() {
            let (du, dv) = match camera.project(&pose.transform_point(object)) {
                Some((u, v)) => (u - image.x, v - image.y),
                None => (BEHIND_CAMERA_RESIDUAL, BEHIND_CAMERA_RESIDUAL),
            };
            out[2 * j] = du;
            out[2 * j + 1] = dv;
        }
    }

    fn residuals_at(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        let camera = self.layout.camera(x)?;
        let grid = self.layout.grid(x, self.input.object_points);
        let block = 2 * grid.len();

        let mut r = DVector::zeros(block * self.layout.views);
        for (v, observed) in self.input.image_points.iter().enumerate() {
            let pose = self.layout.pose(x, v);
            let out = &mut r.as_mut_slice()[v * block..(v + 1) * block];
            Self::view_residuals(&camera, &pose, &grid, observed, out);
        }
        Some(r)
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for PlanarProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals_at(&self.params)
    }

    /// Forward-difference Jacobian. Pose parameters only touch the residual
    /// block of their own view.
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let x = &self.params;
        let r0 = self.residuals_at(x)?;
        let block = 2 * self.input.object_points.len();
        let mut jac = DMatrix::zeros(r0.len(), x.len());
        let mut buf = vec![0.0; block];

        for k in 0..x.len() {
            let step = FD_STEP * x[k].abs().max(1.0);
            let mut xk = x.clone();
            xk[k] += step;

            match self.layout.pose_view(k) {
                Some(v) => {
                    let camera = self.layout.camera(&xk)?;
                    let grid = self.layout.grid(&xk, self.input.object_points);
                    let pose = self.layout.pose(&xk, v);
                    Self::view_residuals(&camera, &pose, &grid, &self.input.image_points[v], &mut buf);
                    for (i, value) in buf.iter().enumerate() {
                        let row = v * block + i;
                        jac[(row, k)] = (value - r0[row]) / step;
                    }
                }
                None => {
                    let rk = self.residuals_at(&xk)?;
                    jac.set_column(k, &((rk - &r0) / step));
                }
            }
        }
        Some(jac)
    }
}

/// Hartley normalisation: centroid to the origin, mean distance `sqrt(2)`
fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let n = pts.len() as f64;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        2.0_f64.sqrt() / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

/// Normalised DLT estimate of `H` with `image ~ H * plane`, scaled so `H[2,2] = 1`
pub(crate) fn estimate_homography(plane: &[Point2<f64>], image: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let n = plane.len();
    if n < 4 || image.len() != n {
        return None;
    }

    let (p, tp) = normalize_points(plane);
    let (q, tq) = normalize_points(image);

    // nalgebra's SVD is thin; pad to at least 9 rows so V^T carries the null vector
    let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);
    for k in 0..n {
        let (x, y) = (p[k].x, p[k].y);
        let (u, v) = (q[k].x, q[k].y);

        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let h = v_t.row(v_t.nrows().checked_sub(1)?);
    let hn = Matrix3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    let h_den = tq.try_inverse()? * hn * tp;
    let s = h_den[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h_den / s)
}

/// The 6-vector `v_ij(H)` of Zhang's constraint system
fn v_ij(hmtx: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Closed-form `[fx, fy, cx, cy]` from at least three plane homographies
fn intrinsics_from_homographies(hmtxs: &[Matrix3<f64>]) -> Result<[f64; 4]> {
    if hmtxs.len() < 3 {
        return Err(VxpError::InsufficientData(format!(
            "need at least 3 homographies, got {}",
            hmtxs.len()
        )));
    }

    let mut vmtx = DMatrix::<f64>::zeros(2 * hmtxs.len(), 6);
    for (k, hmtx) in hmtxs.iter().enumerate() {
        let v11 = v_ij(hmtx, 0, 0);
        let v22 = v_ij(hmtx, 1, 1);
        let v12 = v_ij(hmtx, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| VxpError::Numerical("SVD of the intrinsic system failed".to_string()))?;
    let b = v_t.row(v_t.nrows() - 1);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-6 {
        return Err(VxpError::Numerical(
            "degenerate view configuration for intrinsic initialisation".to_string(),
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let intr = [alpha, beta, u0, v0];
    if intr.iter().any(|v| !v.is_finite()) || alpha <= 0.0 || beta <= 0.0 {
        return Err(VxpError::Numerical(
            "closed-form intrinsics are not finite".to_string(),
        ));
    }
    Ok(intr)
}

/// Decompose a plane homography into the board-to-camera pose
fn pose_from_homography(kmtx: &Matrix3<f64>, hmtx: &Matrix3<f64>) -> Result<ViewPose> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or_else(|| VxpError::Numerical("camera matrix is singular".to_string()))?;

    let k_inv_h1 = k_inv * hmtx.column(0);
    let k_inv_h2 = k_inv * hmtx.column(1);
    let lambda = 1.0 / ((k_inv_h1.norm() + k_inv_h2.norm()) * 0.5);

    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);
    let r_mat = Matrix3::from_columns(&[r1, r2, r3]);

    // nearest rotation
    let svd = r_mat.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(VxpError::Numerical("SVD of the rotation failed".to_string())),
    };
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let tvec = lambda * (k_inv * hmtx.column(2));
    Ok(ViewPose::from_rotation_matrix(&r_orth, tvec))
}
