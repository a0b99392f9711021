use crate::camera::FrameSource;
use crate::common::{FaceGateError, Result};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "pgm"];

/// Replays image files from a directory in name order. Running out of frames
/// is reported as a camera failure, the same as an unplugged device.
pub struct DirectoryFrameSource {
    frames: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

impl DirectoryFrameSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut frames = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_frame {
                frames.push(path);
            }
        }
        frames.sort();

        if frames.is_empty() {
            return Err(FaceGateError::Camera(format!("No frames found in {}", dir.display())));
        }
        tracing::info!("Replaying {} frame(s) from {}", frames.len(), dir.display());

        Ok(Self { frames, next: 0, looping: false })
    }

    /// Restart from the first frame instead of failing at the end.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        if self.next >= self.frames.len() {
            if !self.looping {
                return Err(FaceGateError::Camera("Frame replay exhausted".into()));
            }
            self.next = 0;
        }

        let path = &self.frames[self.next];
        self.next += 1;
        image::open(path)
            .map_err(|e| FaceGateError::Camera(format!("Failed to read frame {:?}: {}", path, e)))
    }
}
