use serde::{Deserialize, Serialize};
use std::fmt;

/// Name reported for a face that matches no registered reference.
pub const UNKNOWN_NAME: &str = "unknown";

/// Bounding box for a detected face, with optional facial landmarks.
///
/// Coordinates are in the pixel space of the image the detector ran on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face descriptor (embedding vector) produced by an encoder for exactly one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDescriptor {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Euclidean distance between two descriptors.
    ///
    /// Descriptors of different lengths are compared over their common prefix.
    pub fn distance(&self, other: &FaceDescriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// True when `other` lies within `tolerance` of this descriptor (inclusive).
    pub fn matches(&self, other: &FaceDescriptor, tolerance: f32) -> bool {
        self.distance(other) <= tolerance
    }
}

/// A registered reference face: a label and the descriptor computed from its image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedDescriptor {
    pub name: String,
    pub descriptor: FaceDescriptor,
}

/// Face region in integer pixel coordinates, `(top, right, bottom, left)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl DetectedRegion {
    pub fn new(top: i32, right: i32, bottom: i32, left: i32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Convert a detector box to an integer region clamped to a `width` x `height` image.
    ///
    /// Edges are truncated toward zero. `top`/`left` are pixel indices
    /// (`0..dim`), `right`/`bottom` are exclusive edges and may equal the
    /// image size, so a box touching the border still spans the full frame.
    pub fn from_bbox(bbox: &BoundingBox, width: u32, height: u32) -> Self {
        let (w, h) = (width as i32, height as i32);
        Self {
            top: (bbox.y as i32).clamp(0, (h - 1).max(0)),
            right: ((bbox.x + bbox.width) as i32).clamp(0, w),
            bottom: ((bbox.y + bbox.height) as i32).clamp(0, h),
            left: (bbox.x as i32).clamp(0, (w - 1).max(0)),
        }
    }
}

/// Outcome of identifying one face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn name(&self) -> &str {
        match self {
            Identity::Known(name) => name,
            Identity::Unknown => UNKNOWN_NAME,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Identity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// A labelled face in original-frame coordinates, produced once per frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub region: DetectedRegion,
    #[serde(rename = "name")]
    pub identity: Identity,
}
