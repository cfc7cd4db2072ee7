//! Camera models and projections

mod distortion;
mod pinhole;

pub use distortion::DistortionError;
pub use pinhole::PinholeCamera;

use nalgebra::Vector3;

/// Generic CameraModel
pub trait CameraModel {
    /// Project 3D point in camera frame to image coordinates
    /// Returns None if point is behind camera
    fn project(&self, point_camera: &Vector3<f64>) -> Option<(f64, f64)>;
}
