use thiserror::Error;

/// Common errors across the camera preparation pipeline
#[derive(Error, Debug)]
pub enum VxpError {
    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Calibration failed: {0}")]
    CalibrationFailed(String),

    #[error("I/O error: {0}")]
    Io(String),
}

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("Point behind camera")]
    BehindCamera,

    #[error("Point count mismatch: expected {expected}, got {actual}")]
    PointCountMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, VxpError>;
