pub mod replay;
pub mod v4l2;

use crate::common::Result;
use image::DynamicImage;

pub use replay::DirectoryFrameSource;
pub use v4l2::{Camera, CameraInfo, CameraSession};

/// Lazy, possibly endless supply of frames. An `Err` ends the session that
/// pulled it; callers never retry.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<DynamicImage>;
}

impl<F: FrameSource + ?Sized> FrameSource for &mut F {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        (**self).next_frame()
    }
}

impl<F: FrameSource + ?Sized> FrameSource for Box<F> {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        (**self).next_frame()
    }
}
