use std::path::PathBuf;
use std::str::FromStr;

use facetag_core::ResizeFactor;

/// Runtime configuration, loaded from `FACETAG_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the SCRFD and ArcFace ONNX files.
    pub model_dir: PathBuf,
    /// Managed directory of reference images (default: ./images).
    pub images_dir: PathBuf,
    /// Downscale applied to frames before detection.
    pub resize_factor: ResizeFactor,
    /// Tick rate of the capture loop.
    pub fps: f64,
    /// Match tolerance; `None` uses the encoder's own default.
    pub tolerance: Option<f32>,
    /// Frames discarded after opening the camera (AGC/AE settling).
    pub warmup_frames: usize,
    /// Start with recognition enabled.
    pub autostart: bool,
}

impl Config {
    /// Load configuration from `FACETAG_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let resize_factor = parsed(&lookup, "FACETAG_RESIZE_FACTOR")
            .and_then(|f: f64| match ResizeFactor::new(f) {
                Ok(factor) => Some(factor),
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring FACETAG_RESIZE_FACTOR");
                    None
                }
            })
            .unwrap_or_default();

        let fps = parsed(&lookup, "FACETAG_FPS")
            .filter(|fps: &f64| fps.is_finite() && *fps > 0.0)
            .unwrap_or(30.0);

        Self {
            camera_device: lookup("FACETAG_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: lookup("FACETAG_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facetag_core::default_model_dir),
            images_dir: lookup("FACETAG_IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("images")),
            resize_factor,
            fps,
            tolerance: parsed(&lookup, "FACETAG_TOLERANCE").filter(|&tolerance| {
                let valid = is_valid_tolerance(tolerance);
                if !valid {
                    tracing::warn!(
                        tolerance,
                        "ignoring FACETAG_TOLERANCE, must be finite and >= 0"
                    );
                }
                valid
            }),
            warmup_frames: parsed(&lookup, "FACETAG_WARMUP_FRAMES").unwrap_or(4),
            autostart: lookup("FACETAG_AUTOSTART").is_some_and(|v| v != "0"),
        }
    }
}

/// A match tolerance is a distance: finite and non-negative.
pub fn is_valid_tolerance(tolerance: f32) -> bool {
    tolerance.is_finite() && tolerance >= 0.0
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %value, "unparseable value, using default");
            None
        }
    }
}
