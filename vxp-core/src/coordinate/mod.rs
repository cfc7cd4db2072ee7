//! Board-to-camera coordinate transforms

mod transforms;

pub use transforms::ViewPose;
