//! Streaming V4L2 capture.

use crate::frame::{self, Frame, FrameError};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("frame conversion failed: {0}")]
    Frame(#[from] FrameError),
}

/// A source of frames delivered one tick at a time.
///
/// Implementations release their device when dropped.
pub trait CaptureSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        (**self).next_frame()
    }
}

/// A V4L2 node that supports video capture.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel formats the camera may negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, Y channel extracted).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            b"Y16 " | b"Y16\0" => Some(Self::Y16),
            _ => None,
        }
    }
}

/// V4L2 camera with a streaming mmap queue kept open between frames.
pub struct Camera {
    stream: MmapStream<'static>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 capture device (e.g. "/dev/video0") and start streaming.
    ///
    /// 640x480 YUYV is requested; the driver may substitute GREY or Y16.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }
        let device = Device::with_path(device_path).map_err(|e| match e.raw_os_error() {
            Some(EBUSY) => CameraError::DeviceBusy,
            _ => CameraError::DeviceNotFound(format!("{device_path}: {e}")),
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("VIDIOC_QUERYCAP: {e}")))?;
        if !is_capture_device(&caps) {
            return Err(CameraError::StreamingNotSupported);
        }
        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        let (width, height, fourcc, pixel_format) = negotiate(&device)?;
        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("mmap stream setup: {e}")))?;

        Ok(Self {
            stream,
            width,
            height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Scan /dev/video0..15 for devices that support video capture.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                is_capture_device(&caps).then(|| DeviceInfo {
                    path,
                    name: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                })
            })
            .collect()
    }
}

const EBUSY: i32 = 16;

fn is_capture_device(caps: &v4l::capability::Capabilities) -> bool {
    caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE)
}

fn negotiate(device: &Device) -> Result<(u32, u32, FourCC, PixelFormat), CameraError> {
    let mut requested = device
        .format()
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("VIDIOC_G_FMT: {e}")))?;
    requested.width = REQUESTED_WIDTH;
    requested.height = REQUESTED_HEIGHT;
    requested.fourcc = FourCC::new(b"YUYV");

    let format = device
        .set_format(&requested)
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("VIDIOC_S_FMT: {e}")))?;
    let pixel_format = PixelFormat::from_fourcc(format.fourcc).ok_or_else(|| {
        CameraError::FormatNegotiationFailed(format!(
            "driver offered {:?}, expected YUYV, GREY or Y16",
            format.fourcc
        ))
    })?;
    tracing::info!(
        width = format.width,
        height = format.height,
        fourcc = ?format.fourcc,
        "capture format"
    );
    Ok((format.width, format.height, format.fourcc, pixel_format))
}

/// Extract 8-bit luma from a dequeued buffer.
fn to_grayscale(
    format: PixelFormat,
    buf: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, FrameError> {
    match format {
        PixelFormat::Grey => frame::grey_to_grayscale(buf, width, height),
        PixelFormat::Y16 => frame::y16_to_grayscale(buf, width, height),
        PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, width, height),
    }
}

impl CaptureSource for Camera {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (width, height, format) = (self.width, self.height, self.pixel_format);
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("VIDIOC_DQBUF: {e}")))?;
        let sequence = meta.sequence;
        let data = to_grayscale(format, buf, width, height)?;

        Ok(Frame {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

}

impl Drop for Camera {
    fn drop(&mut self) {
        tracing::info!(device = %self.device_path, "releasing camera");
    }
}
