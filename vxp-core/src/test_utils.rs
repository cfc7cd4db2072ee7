//! In-memory collaborators shared by unit tests

use std::cell::Cell;
use std::rc::Rc;

use crate::error::Result;
use crate::source::{Frame, FrameSource};

/// Frame source backed by a vector; `None` entries decode as empty frames
pub struct VecSource {
    frames: Vec<Option<Frame>>,
    cursor: usize,
    pub seeks: Vec<usize>,
    pub decodes: Rc<Cell<usize>>,
}

impl VecSource {
    pub fn new(frames: Vec<Option<Frame>>) -> Self {
        Self {
            frames,
            cursor: 0,
            seeks: Vec::new(),
            decodes: Rc::new(Cell::new(0)),
        }
    }
}

impl FrameSource for VecSource {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn seek(&mut self, index: usize) -> Result<()> {
        self.seeks.push(index);
        self.cursor = index;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.decodes.set(self.decodes.get() + 1);
        let frame = self.frames.get(self.cursor).cloned().flatten();
        self.cursor += 1;
        Ok(frame)
    }
}

/// Frame filled with one colour per channel
pub fn solid_frame(width: usize, height: usize, rgb: [u8; 3]) -> Frame {
    Frame::from_shape_fn((height, width, 3), |(_, _, c)| rgb[c])
}
