//! Planar calibration target layouts

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VxpError};

/// Kind of physical calibration target filmed in the calibration video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    #[default]
    Chessboard,
    CirclesGrid,
    AsymmetricCirclesGrid,
}

/// Ideal point layout of a planar target, in board units on the `Z = 0` plane.
/// Built through [`PatternGeometry::new`], which rejects empty or unscaled boards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatternGeometry {
    /// Regular rectangular lattice (chessboard inner corners, symmetric circle grid)
    Grid {
        cols: usize,
        rows: usize,
        spacing: f64,
    },
    /// Every other row shifted by half a period (asymmetric circle grid)
    Staggered {
        cols: usize,
        rows: usize,
        spacing: f64,
    },
}

impl PatternGeometry {
    pub fn new(kind: PatternKind, cols: usize, rows: usize, spacing: f64) -> Result<Self> {
        if cols == 0 || rows == 0 {
            return Err(VxpError::InvalidConfig(format!(
                "board size must be positive, got {cols}x{rows}"
            )));
        }
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(VxpError::InvalidConfig(format!(
                "square size must be positive, got {spacing}"
            )));
        }

        Ok(match kind {
            PatternKind::Chessboard | PatternKind::CirclesGrid => {
                PatternGeometry::Grid { cols, rows, spacing }
            }
            PatternKind::AsymmetricCirclesGrid => PatternGeometry::Staggered { cols, rows, spacing },
        })
    }

    pub fn cols(&self) -> usize {
        match *self {
            PatternGeometry::Grid { cols, .. } | PatternGeometry::Staggered { cols, .. } => cols,
        }
    }

    pub fn rows(&self) -> usize {
        match *self {
            PatternGeometry::Grid { rows, .. } | PatternGeometry::Staggered { rows, .. } => rows,
        }
    }

    pub fn spacing(&self) -> f64 {
        match *self {
            PatternGeometry::Grid { spacing, .. } | PatternGeometry::Staggered { spacing, .. } => {
                spacing
            }
        }
    }

    pub fn point_count(&self) -> usize {
        self.cols() * self.rows()
    }

    /// Object points in row-major detection order
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let mut points = Vec::with_capacity(self.point_count());
        match *self {
            PatternGeometry::Grid { cols, rows, spacing } => {
                for i in 0..rows {
                    for j in 0..cols {
                        points.push(Point3::new(j as f64 * spacing, i as f64 * spacing, 0.0));
                    }
                }
            }
            PatternGeometry::Staggered { cols, rows, spacing } => {
                for i in 0..rows {
                    for j in 0..cols {
                        let x = (2 * j + i % 2) as f64 * spacing;
                        points.push(Point3::new(x, i as f64 * spacing, 0.0));
                    }
                }
            }
        }
        points
    }

    /// Distance between the first and the last point of the first row
    pub fn grid_width(&self) -> f64 {
        let span = self.cols().saturating_sub(1) as f64 * self.spacing();
        match self {
            PatternGeometry::Grid { .. } => span,
            PatternGeometry::Staggered { .. } => 2.0 * span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_layout_is_row_major() {
        let g = PatternGeometry::new(PatternKind::Chessboard, 3, 2, 10.0).unwrap();
        let pts = g.object_points();
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[2], Point3::new(20.0, 0.0, 0.0));
        assert_eq!(pts[3], Point3::new(0.0, 10.0, 0.0));
        assert!(pts.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn circles_grid_shares_the_lattice() {
        let a = PatternGeometry::new(PatternKind::Chessboard, 4, 3, 2.5).unwrap();
        let b = PatternGeometry::new(PatternKind::CirclesGrid, 4, 3, 2.5).unwrap();
        assert_eq!(a.object_points(), b.object_points());
    }

    #[test]
    fn staggered_rows_shift_by_one_period() {
        let g = PatternGeometry::new(PatternKind::AsymmetricCirclesGrid, 2, 2, 1.0).unwrap();
        let pts = g.object_points();
        assert_eq!(pts[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[1], Point3::new(2.0, 0.0, 0.0));
        assert_eq!(pts[2], Point3::new(1.0, 1.0, 0.0));
        assert_eq!(pts[3], Point3::new(3.0, 1.0, 0.0));
    }

    #[test]
    fn grid_width_matches_first_row_span() {
        let g = PatternGeometry::new(PatternKind::Chessboard, 8, 6, 115.0).unwrap();
        assert_eq!(g.grid_width(), 115.0 * 7.0);

        let s = PatternGeometry::new(PatternKind::AsymmetricCirclesGrid, 4, 11, 1.0).unwrap();
        assert_eq!(s.grid_width(), 6.0);
        let pts = s.object_points();
        assert_eq!(pts[3].x - pts[0].x, s.grid_width());

        let empty = PatternGeometry::Grid {
            cols: 0,
            rows: 0,
            spacing: 1.0,
        };
        assert_eq!(empty.grid_width(), 0.0);
    }

    #[test]
    fn rejects_degenerate_boards() {
        assert!(matches!(
            PatternGeometry::new(PatternKind::Chessboard, 0, 6, 1.0),
            Err(VxpError::InvalidConfig(_))
        ));
        assert!(matches!(
            PatternGeometry::new(PatternKind::Chessboard, 8, 6, 0.0),
            Err(VxpError::InvalidConfig(_))
        ));
        assert!(matches!(
            PatternGeometry::new(PatternKind::Chessboard, 8, 6, f64::NAN),
            Err(VxpError::InvalidConfig(_))
        ));
    }
}
