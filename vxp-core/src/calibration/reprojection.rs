use nalgebra::{Point2, Point3};

use crate::camera::{CameraModel, PinholeCamera};
use crate::coordinate::ViewPose;
use crate::error::{ProjectionError, Result, VxpError};

/// Image-plane residuals of a calibration against its observations
#[derive(Debug, Clone, PartialEq)]
pub struct ReprojectionErrors {
    /// RMS point distance per view
    pub per_view: Vec<f64>,
    /// RMS point distance over every point of every view
    pub total: f64,
}

/// Project the object grid through each view pose and compare against the
/// detected image points.
pub fn reprojection_errors(
    camera: &PinholeCamera,
    object_points: &[Point3<f64>],
    image_points: &[Vec<Point2<f64>>],
    poses: &[ViewPose],
) -> Result<ReprojectionErrors> {
    if image_points.len() != poses.len() {
        return Err(VxpError::InvalidInput(format!(
            "{} views but {} poses",
            image_points.len(),
            poses.len()
        )));
    }
    if image_points.is_empty() {
        return Err(VxpError::InsufficientData(
            "no views to evaluate".to_string(),
        ));
    }

    let mut per_view = Vec::with_capacity(poses.len());
    let mut total_sq = 0.0;
    let mut total_points = 0usize;

    for (observed, pose) in image_points.iter().zip(poses) {
        if observed.len() != object_points.len() {
            return Err(ProjectionError::PointCountMismatch {
                expected: object_points.len(),
                actual: observed.len(),
            }
            .into());
        }

        let mut view_sq = 0.0;
        for (object, image) in object_points.iter().zip(observed) {
            let (u, v) = camera
                .project(&pose.transform_point(object))
                .ok_or(ProjectionError::BehindCamera)?;
            let (du, dv) = (u - image.x, v - image.y);
            view_sq += du * du + dv * dv;
        }

        let n = observed.len();
        per_view.push(if n > 0 { (view_sq / n as f64).sqrt() } else { 0.0 });
        total_sq += view_sq;
        total_points += n;
    }

    let total = if total_points > 0 {
        (total_sq / total_points as f64).sqrt()
    } else {
        0.0
    };

    Ok(ReprojectionErrors { per_view, total })
}
