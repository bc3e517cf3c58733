//! facetag-core — Face registration, matching and frame reconciliation.
//!
//! Reference images are turned into descriptors by a [`FaceEncoder`]
//! (SCRFD detection + ArcFace embedding via ONNX Runtime by default), and
//! live frames are labelled by nearest-neighbour matching against them.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod matcher;
pub mod reconcile;
pub mod recognizer;
pub mod session;
pub mod store;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use encoder::{EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use matcher::{Matcher, MatchOutcome, NearestNeighborMatcher, DEFAULT_TOLERANCE};
pub use reconcile::{rescale, rescale_inverse, ResizeFactor};
pub use recognizer::FaceRecognizer;
pub use session::{RecognitionSession, SessionError};
pub use store::{DescriptorStore, StoreError};
pub use types::{
    BoundingBox, DetectedRegion, FaceDescriptor, Identity, MatchResult, NamedDescriptor,
};

/// Default location of the ONNX models: `$XDG_DATA_HOME/facetag/models`,
/// falling back to `~/.local/share/facetag/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facetag")
        .join("models")
}
