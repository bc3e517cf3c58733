//! Mapping between resized-frame and original-frame coordinates.
//!
//! All conversions truncate toward zero (`f64 as i32`), so a rescaled box can
//! sit up to one pixel up/left of the exact value.

use crate::types::DetectedRegion;
use std::fmt;
use thiserror::Error;

/// Default downscale applied to frames before detection.
pub const DEFAULT_RESIZE_FACTOR: f64 = 0.25;

#[derive(Error, Debug, PartialEq)]
#[error("resize factor must be a positive finite number, got {0}")]
pub struct ResizeFactorError(pub f64);

/// Scale relating resized coordinates to original ones: `original = resized / factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeFactor(f64);

impl ResizeFactor {
    pub fn new(factor: f64) -> Result<Self, ResizeFactorError> {
        if factor.is_finite() && factor > 0.0 {
            Ok(Self(factor))
        } else {
            Err(ResizeFactorError(factor))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for ResizeFactor {
    fn default() -> Self {
        Self(DEFAULT_RESIZE_FACTOR)
    }
}

impl fmt::Display for ResizeFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn map_region(region: DetectedRegion, scale: impl Fn(i32) -> f64) -> DetectedRegion {
    DetectedRegion {
        top: scale(region.top) as i32,
        right: scale(region.right) as i32,
        bottom: scale(region.bottom) as i32,
        left: scale(region.left) as i32,
    }
}

/// Map a region detected on the resized frame back onto the original frame.
pub fn rescale(region: DetectedRegion, factor: ResizeFactor) -> DetectedRegion {
    map_region(region, |v| v as f64 / factor.0)
}

/// Map a region from original-frame coordinates onto the resized frame.
pub fn rescale_inverse(region: DetectedRegion, factor: ResizeFactor) -> DetectedRegion {
    map_region(region, |v| v as f64 * factor.0)
}

/// Size of a `width` x `height` frame after downscaling (rounded, at least 1x1).
pub fn resized_dimensions(width: u32, height: u32, factor: ResizeFactor) -> (u32, u32) {
    let scale = |dim: u32| ((dim as f64 * factor.0).round() as u32).max(1);
    (scale(width), scale(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(f: f64) -> ResizeFactor {
        ResizeFactor::new(f).unwrap()
    }

    #[test]
    fn test_rescale_quarter() {
        let region = DetectedRegion::new(10, 50, 40, 5);
        assert_eq!(
            rescale(region, ResizeFactor::default()),
            DetectedRegion::new(40, 200, 160, 20)
        );
    }

    #[test]
    fn test_rescale_truncates_toward_zero() {
        // 10 / 0.3 = 33.33.., 7 / 0.3 = 23.33..
        let region = DetectedRegion::new(10, 7, 10, 7);
        assert_eq!(rescale(region, factor(0.3)), DetectedRegion::new(33, 23, 33, 23));
        // Negative coordinates truncate toward zero too.
        let negative = DetectedRegion::new(-1, -1, -1, -1);
        assert_eq!(rescale(negative, factor(0.3)), DetectedRegion::new(-3, -3, -3, -3));
    }

    #[test]
    fn test_roundtrip_within_one_pixel() {
        for f in [0.1, 0.25, 0.3, 0.5, 0.77, 1.0] {
            for v in [0, 1, 3, 17, 99, 240, 479] {
                let region = DetectedRegion::new(v, v + 11, v + 29, v / 2);
                let back = rescale_inverse(rescale(region, factor(f)), factor(f));
                for (got, want) in [
                    (back.top, region.top),
                    (back.right, region.right),
                    (back.bottom, region.bottom),
                    (back.left, region.left),
                ] {
                    assert!((got - want).abs() <= 1, "factor {f}: {got} vs {want}");
                }
            }
        }
    }

    #[test]
    fn test_factor_validation() {
        assert!(ResizeFactor::new(0.0).is_err());
        assert!(ResizeFactor::new(-0.5).is_err());
        assert!(ResizeFactor::new(f64::NAN).is_err());
        assert!(ResizeFactor::new(f64::INFINITY).is_err());
        assert_eq!(ResizeFactor::new(2.0).map(ResizeFactor::get), Ok(2.0));
    }

    #[test]
    fn test_resized_dimensions() {
        assert_eq!(resized_dimensions(640, 480, ResizeFactor::default()), (160, 120));
        assert_eq!(resized_dimensions(641, 3, ResizeFactor::default()), (160, 1));
        assert_eq!(resized_dimensions(1, 1, factor(0.1)), (1, 1));
    }
}
