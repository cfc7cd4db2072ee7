//! Frame access and pattern detection collaborators

use nalgebra::Point2;
use ndarray::Array3;

use crate::error::Result;
use crate::pattern::PatternGeometry;

/// Decoded raster, shape `[height, width, channels]`
pub type Frame = Array3<u8>;

/// `(width, height)` of a frame
pub fn frame_size(frame: &Frame) -> (usize, usize) {
    let (h, w, _) = frame.dim();
    (w, h)
}

/// Sequential, seekable access to the decoded frames of one video
pub trait FrameSource {
    /// Total number of frames the source reports
    fn frame_count(&self) -> usize;

    /// Position the source so that the next decode returns frame `index`
    fn seek(&mut self, index: usize) -> Result<()>;

    /// Decode the next frame. `Ok(None)` signals an empty frame: end of
    /// stream or a frame that failed to decode.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Finds a planar calibration target in a frame
pub trait PatternDetector {
    /// Detected image points in the geometry's object-point order, or `None`
    /// when the target is not fully visible.
    fn detect(
        &mut self,
        frame_index: usize,
        frame: &Frame,
        geometry: &PatternGeometry,
    ) -> Result<Option<Vec<Point2<f64>>>>;
}
