//! Static background estimation by per-pixel temporal median

use log::{debug, info, warn};
use ndarray::Zip;
use rand::Rng;

use crate::error::{Result, VxpError};
use crate::source::{Frame, FrameSource, frame_size};

/// Default number of frames drawn from a background video
pub const DEFAULT_SAMPLES: usize = 10;

/// Persistence of one camera's background image
pub trait BackgroundStore {
    /// Whether a background image is already stored
    fn exists(&self) -> bool;

    fn save(&mut self, background: &Frame) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundOutcome {
    /// A stored background was found; the video was not opened
    Cached,
    /// A new background was estimated from `samples_used` decoded frames
    Created { samples_used: usize },
}

/// Lower-middle order statistic: element `(n - 1) / 2` of the sorted values.
///
/// For an even count this is the smaller of the two middle values. Reorders
/// `values` in place.
pub fn lower_median(values: &mut [u8]) -> Option<u8> {
    if values.is_empty() {
        return None;
    }
    let mid = (values.len() - 1) / 2;
    let (_, median, _) = values.select_nth_unstable(mid);
    Some(*median)
}

/// Per-pixel, per-channel lower median of a stack of equally sized frames
pub fn median_frame(frames: &[Frame]) -> Result<Frame> {
    let first = frames.first().ok_or_else(|| {
        VxpError::InsufficientData("no frames to compute a median from".to_string())
    })?;
    let dim = first.dim();
    if let Some(bad) = frames.iter().find(|f| f.dim() != dim) {
        return Err(VxpError::InvalidInput(format!(
            "frame shape {:?} differs from {:?}",
            bad.dim(),
            dim
        )));
    }

    let mut out = Frame::zeros(dim);
    Zip::indexed(&mut out).par_for_each(|(y, x, c), value| {
        let mut samples: Vec<u8> = frames.iter().map(|f| f[[y, x, c]]).collect();
        // non-empty: `frames` has at least one element
        *value = lower_median(&mut samples).unwrap_or_default();
    });
    Ok(out)
}

/// Draw `count` independent frame indices uniformly from `[0, frame_count)`.
///
/// Indices may repeat.
pub fn sample_indices<R: Rng + ?Sized>(frame_count: usize, count: usize, rng: &mut R) -> Vec<usize> {
    if frame_count == 0 {
        return Vec::new();
    }
    (0..count).map(|_| rng.random_range(0..frame_count)).collect()
}

/// Decode one frame at each sampled index. Empty frames, and frames whose
/// shape differs from the first decoded one, are dropped without retry.
pub fn sample_frames<S, R>(source: &mut S, count: usize, rng: &mut R) -> Result<Vec<Frame>>
where
    S: FrameSource + ?Sized,
    R: Rng + ?Sized,
{
    let frame_count = source.frame_count();
    let indices = sample_indices(frame_count, count, rng);
    debug!("sampling frames {indices:?} of {frame_count}");

    let mut frames: Vec<Frame> = Vec::with_capacity(indices.len());
    for index in indices {
        source.seek(index)?;
        let Some(frame) = source.next_frame()? else {
            warn!("frame {index} decoded empty, skipping");
            continue;
        };
        if let Some(first) = frames.first() {
            if first.dim() != frame.dim() {
                warn!(
                    "frame {index} has shape {:?}, expected {:?}, skipping",
                    frame.dim(),
                    first.dim()
                );
                continue;
            }
        }
        frames.push(frame);
    }
    Ok(frames)
}

/// Estimate a background image from `count` randomly sampled frames
pub fn estimate_background<S, R>(source: &mut S, count: usize, rng: &mut R) -> Result<Frame>
where
    S: FrameSource + ?Sized,
    R: Rng + ?Sized,
{
    sampled_median(source, count, rng).map(|(background, _)| background)
}

/// Median of the sampled frames together with how many of them decoded
fn sampled_median<S, R>(source: &mut S, count: usize, rng: &mut R) -> Result<(Frame, usize)>
where
    S: FrameSource + ?Sized,
    R: Rng + ?Sized,
{
    if count == 0 {
        return Err(VxpError::InvalidConfig(
            "background sample count must be positive".to_string(),
        ));
    }

    let frames = sample_frames(source, count, rng)?;
    if frames.is_empty() {
        return Err(VxpError::InsufficientData(format!(
            "none of {count} sampled frames decoded"
        )));
    }

    let (w, h) = frame_size(&frames[0]);
    info!("computing median of {} frames ({w}x{h})", frames.len());
    Ok((median_frame(&frames)?, frames.len()))
}

/// Return early when `store` already holds a background; otherwise open the
/// video, estimate the background and save it.
pub fn ensure_background<B, S, F, R>(
    store: &mut B,
    open: F,
    count: usize,
    rng: &mut R,
) -> Result<BackgroundOutcome>
where
    B: BackgroundStore + ?Sized,
    S: FrameSource,
    F: FnOnce() -> Result<S>,
    R: Rng + ?Sized,
{
    if store.exists() {
        info!("background image located, skipping estimation");
        return Ok(BackgroundOutcome::Cached);
    }

    let mut source = open()?;
    let (background, samples_used) = sampled_median(&mut source, count, rng)?;
    store.save(&background)?;

    Ok(BackgroundOutcome::Created { samples_used })
}
