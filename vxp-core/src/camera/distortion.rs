use thiserror::Error;

/// Internal distortion models used by camera implementations
#[derive(Debug, Clone, PartialEq)]
pub(super) enum DistortionModel {
    None,
    /// Radial rational model with tangential terms, coefficients stored in
    /// the conventional `(k1, k2, p1, p2, k3, k4, k5, k6)` order.
    Rational {
        k1: f64,
        k2: f64,
        p1: f64,
        p2: f64,
        k3: f64,
        k4: f64,
        k5: f64,
        k6: f64,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistortionError {
    #[error("unsupported distortion vector length {0} (expected 4, 5 or 8)")]
    UnsupportedLength(usize),
}

type Result<T> = std::result::Result<T, DistortionError>;

impl DistortionModel {
    /// Build from a coefficient vector of length 4, 5 or 8; missing terms are zero.
    pub(super) fn from_coefficients(coeffs: &[f64]) -> Result<Self> {
        if !matches!(coeffs.len(), 4 | 5 | 8) {
            return Err(DistortionError::UnsupportedLength(coeffs.len()));
        }
        if coeffs.iter().all(|c| *c == 0.0) {
            return Ok(DistortionModel::None);
        }

        let at = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Ok(DistortionModel::Rational {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
            k4: at(5),
            k5: at(6),
            k6: at(7),
        })
    }

    pub(super) fn coefficients(&self) -> [f64; 8] {
        match self {
            DistortionModel::None => [0.0; 8],
            DistortionModel::Rational {
                k1,
                k2,
                p1,
                p2,
                k3,
                k4,
                k5,
                k6,
            } => [*k1, *k2, *p1, *p2, *k3, *k4, *k5, *k6],
        }
    }

    /// Apply distortion to normalized image coordinates
    pub(super) fn distort(&self, x_norm: f64, y_norm: f64) -> (f64, f64) {
        match self {
            DistortionModel::None => (x_norm, y_norm),

            DistortionModel::Rational {
                k1,
                k2,
                p1,
                p2,
                k3,
                k4,
                k5,
                k6,
            } => {
                let r2 = x_norm * x_norm + y_norm * y_norm;
                let r4 = r2 * r2;
                let r6 = r4 * r2;

                let radial =
                    (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);

                let x_dist = x_norm * radial
                    + 2.0 * p1 * x_norm * y_norm
                    + p2 * (r2 + 2.0 * x_norm * x_norm);

                let y_dist = y_norm * radial
                    + p1 * (r2 + 2.0 * y_norm * y_norm)
                    + 2.0 * p2 * x_norm * y_norm;

                (x_dist, y_dist)
            }
        }
    }
}
