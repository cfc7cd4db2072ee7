use super::{
    CameraModel,
    distortion::{DistortionError, DistortionModel},
};
use nalgebra::{Matrix3, Vector3};

/// Pinhole camera model with optional distortion
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    distortion: DistortionModel,
}

impl PinholeCamera {
    /// Create a camera from a 3x3 intrinsic matrix and a distortion vector
    /// of length 4, 5 or 8. Skew is ignored.
    pub fn from_parts(camera_matrix: &Matrix3<f64>, distortion: &[f64]) -> Result<Self, DistortionError> {
        Ok(Self {
            fx: camera_matrix[(0, 0)],
            fy: camera_matrix[(1, 1)],
            cx: camera_matrix[(0, 2)],
            cy: camera_matrix[(1, 2)],
            distortion: DistortionModel::from_coefficients(distortion)?,
        })
    }

    /// Create a new pinhole camera with no distortion
    pub fn new_ideal(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: DistortionModel::None,
        }
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Distortion coefficients in `(k1, k2, p1, p2, k3, k4, k5, k6)` order
    pub fn distortion_coefficients(&self) -> [f64; 8] {
        self.distortion.coefficients()
    }
}

impl CameraModel for PinholeCamera {
    fn project(&self, point_camera: &Vector3<f64>) -> Option<(f64, f64)> {
        if point_camera.z <= 0.0 {
            return None;
        }

        // Normalized coordinates
        let x_norm = point_camera.x / point_camera.z;
        let y_norm = point_camera.y / point_camera.z;

        // Apply distortion
        let (x_dist, y_dist) = self.distortion.distort(x_norm, y_norm);

        // To pixel coordinates
        let u = self.fx * x_dist + self.cx;
        let v = self.fy * y_dist + self.cy;

        Some((u, v))
    }
}
