//! Capture source that replays still images, for running without a camera.

use crate::camera::{CameraError, CaptureSource};
use crate::frame::Frame;
use image::GrayImage;
use std::path::Path;

/// Cycles through a fixed list of images, one per frame.
pub struct StillSource {
    images: Vec<GrayImage>,
    next: usize,
    sequence: u32,
}

impl StillSource {
    pub fn new(images: Vec<GrayImage>) -> Self {
        Self {
            images,
            next: 0,
            sequence: 0,
        }
    }

    /// Decode one image file to replay.
    pub fn open(path: &Path) -> Result<Self, CameraError> {
        let image = image::open(path)
            .map_err(|e| CameraError::DeviceNotFound(format!("{}: {e}", path.display())))?
            .to_luma8();
        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "replaying still image"
        );
        Ok(Self::new(vec![image]))
    }
}

impl CaptureSource for StillSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let image = self
            .images
            .get(self.next)
            .cloned()
            .ok_or_else(|| CameraError::CaptureFailed("no images to replay".into()))?;
        self.next = (self.next + 1) % self.images.len();
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Frame::from_image(image, self.sequence))
    }

}
