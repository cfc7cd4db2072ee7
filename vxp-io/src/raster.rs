//! Still-image decode and encode for `[height, width, channels]` frames

use std::fs;
use std::path::{Path, PathBuf};

use image::{ExtendedColorType, ImageFormat};
use vxp_core::source::Frame;

use crate::error::{IoError, Result};

/// File extensions decoded as frames
pub const FRAME_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

pub fn is_frame_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Decode an image file into an RGB frame
pub fn read_frame(path: impl AsRef<Path>) -> Result<Frame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::FileDoesNotExist(path.to_path_buf()));
    }

    let rgb = image::open(path)?.into_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::from_shape_vec((height as usize, width as usize, 3), rgb.into_raw()).map_err(|e| {
        IoError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })
}

/// Write `contents` through a sibling temporary file renamed into place, so
/// `path` holds either its previous contents or the complete new ones.
pub(crate) fn write_atomic<F>(path: &Path, contents: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp = temporary_sibling(path);
    if let Err(e) = contents(&tmp).and_then(|_| fs::rename(&tmp, path).map_err(IoError::from)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Encode a 1- or 3-channel frame as PNG
pub fn write_png(path: impl AsRef<Path>, frame: &Frame) -> Result<()> {
    let (height, width, channels) = frame.dim();
    let color = match channels {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        other => return Err(IoError::UnsupportedChannels(other)),
    };
    let data: Vec<u8> = frame.iter().copied().collect();

    write_atomic(path.as_ref(), |tmp| {
        image::save_buffer_with_format(
            tmp,
            &data,
            width as u32,
            height as u32,
            color,
            ImageFormat::Png,
        )?;
        Ok(())
    })
}
