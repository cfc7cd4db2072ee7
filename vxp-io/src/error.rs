use std::path::PathBuf;

use thiserror::Error;
use vxp_core::VxpError;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("File does not exist: {0}")]
    FileDoesNotExist(PathBuf),

    #[error("No frames found in {0}")]
    EmptySequence(PathBuf),

    #[error("Failed to manipulate the file: {0}")]
    File(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported channel count {0}")]
    UnsupportedChannels(usize),

    #[error("Malformed file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, IoError>;

impl From<IoError> for VxpError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::FileDoesNotExist(path) => {
                VxpError::SourceUnavailable(format!("{} does not exist", path.display()))
            }
            IoError::EmptySequence(path) => {
                VxpError::SourceUnavailable(format!("no frames found in {}", path.display()))
            }
            other => VxpError::Io(other.to_string()),
        }
    }
}
