pub mod background;
pub mod calibration;
pub mod camera;
pub mod capture;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod pattern;
pub mod source;

#[cfg(test)]
mod test_utils;

pub use background::{BackgroundOutcome, BackgroundStore, ensure_background, estimate_background};
pub use calibration::{
    CalibrationOutcome, CalibrationReport, CalibrationSolver, ObservationSet, PlanarSolver,
    ReportSink,
};
pub use camera::{CameraModel, PinholeCamera};
pub use capture::{CaptureOutcome, CaptureState, run_capture};
pub use config::{BackgroundConfig, CaptureConfig, PipelineConfig};
pub use coordinate::ViewPose;
pub use error::{ProjectionError, Result, VxpError};
pub use pattern::{PatternGeometry, PatternKind};
pub use source::{Frame, FrameSource, PatternDetector};
