//! File-backed collaborators for the camera preparation pipeline

pub mod config;
pub mod detections;
pub mod error;
pub mod pipeline;
pub mod raster;
pub mod sequence;
pub mod store;

pub use config::load_config;
pub use detections::DetectionSidecar;
pub use error::IoError;
pub use pipeline::{CalibrationStatus, CameraRun, RunSummary, Stage, process_cameras};
pub use raster::{read_frame, write_png};
pub use sequence::ImageSequence;
pub use store::{FileBackgroundStore, JsonReportSink, read_report};
