use std::fs;
use std::path::Path;

use vxp_core::{PipelineConfig, VxpError};

use crate::error::IoError;

/// Read and validate a JSON pipeline configuration
pub fn load_config(path: impl AsRef<Path>) -> vxp_core::Result<PipelineConfig> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(VxpError::InvalidConfig(format!(
            "configuration file {} not found",
            path.display()
        )));
    }
    let raw = fs::read_to_string(path).map_err(IoError::from)?;
    let config: PipelineConfig = serde_json::from_str(&raw)
        .map_err(|e| VxpError::InvalidConfig(format!("{}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}
