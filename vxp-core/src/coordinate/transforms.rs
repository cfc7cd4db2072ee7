use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Board-to-camera rigid transform of one calibration view.
///
/// `rvec` is an axis-angle rotation (direction = axis, norm = angle in
/// radians) and `tvec` a translation, both expressed in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl ViewPose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    /// Build a pose from a rotation matrix. The matrix is assumed orthonormal.
    pub fn from_rotation_matrix(rotation: &Matrix3<f64>, tvec: Vector3<f64>) -> Self {
        let rot = Rotation3::from_matrix_unchecked(*rotation);
        Self {
            rvec: rot.scaled_axis(),
            tvec,
        }
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::new(self.rvec)
    }

    /// Map a board point into the camera frame
    pub fn transform_point(&self, point: &Point3<f64>) -> Vector3<f64> {
        self.rotation() * point.coords + self.tvec
    }

    /// `[rx, ry, rz, tx, ty, tz]`
    pub fn as_row(&self) -> [f64; 6] {
        [
            self.rvec.x,
            self.rvec.y,
            self.rvec.z,
            self.tvec.x,
            self.tvec.y,
            self.tvec.z,
        ]
    }

    pub fn from_row(&[rx, ry, rz, tx, ty, tz]: &[f64; 6]) -> Self {
        Self {
            rvec: Vector3::new(rx, ry, rz),
            tvec: Vector3::new(tx, ty, tz),
        }
    }
}
