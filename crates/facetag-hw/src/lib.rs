//! facetag-hw — Frame capture.
//!
//! Provides V4L2-based camera access, a still-image replay source and
//! conversion of raw capture buffers to 8-bit grayscale.

pub mod camera;
pub mod frame;
pub mod still;

pub use camera::{Camera, CameraError, CaptureSource, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use still::StillSource;
