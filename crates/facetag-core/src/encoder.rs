//! Detector/encoder boundary and its ONNX implementation.

use crate::detector::{DetectorError, FaceDetector};
use crate::matcher::DEFAULT_TOLERANCE;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, FaceDescriptor};
use image::GrayImage;
use std::path::Path;
use thiserror::Error;

/// SCRFD model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace model file name inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Euclidean tolerance for L2-normalized ArcFace descriptors.
///
/// Equivalent to a cosine similarity of about 0.40.
pub const ARCFACE_TOLERANCE: f32 = 1.10;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in an image and turns each into a descriptor.
pub trait FaceEncoder {
    /// Face regions in the pixel space of `image`, in detector order.
    fn detect_faces(&mut self, image: &GrayImage) -> Result<Vec<BoundingBox>, EncoderError>;

    /// One descriptor per entry of `faces`, in the same order.
    fn encode_faces(
        &mut self,
        image: &GrayImage,
        faces: &[BoundingBox],
    ) -> Result<Vec<FaceDescriptor>, EncoderError>;

    /// Distance tolerance matching this encoder's descriptor scale.
    fn tolerance(&self) -> f32 {
        DEFAULT_TOLERANCE
    }
}

impl<E: FaceEncoder + ?Sized> FaceEncoder for Box<E> {
    fn detect_faces(&mut self, image: &GrayImage) -> Result<Vec<BoundingBox>, EncoderError> {
        (**self).detect_faces(image)
    }

    fn encode_faces(
        &mut self,
        image: &GrayImage,
        faces: &[BoundingBox],
    ) -> Result<Vec<FaceDescriptor>, EncoderError> {
        (**self).encode_faces(image, faces)
    }

    fn tolerance(&self) -> f32 {
        (**self).tolerance()
    }
}

/// SCRFD detection followed by ArcFace encoding.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models from `model_dir`, failing fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect_faces(&mut self, image: &GrayImage) -> Result<Vec<BoundingBox>, EncoderError> {
        Ok(self.detector.detect(image)?)
    }

    fn encode_faces(
        &mut self,
        image: &GrayImage,
        faces: &[BoundingBox],
    ) -> Result<Vec<FaceDescriptor>, EncoderError> {
        faces
            .iter()
            .map(|face| self.recognizer.extract(image, face).map_err(EncoderError::from))
            .collect()
    }

    fn tolerance(&self) -> f32 {
        ARCFACE_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arcface_tolerance_matches_cosine_threshold() {
        // For unit vectors |a - b|^2 = 2 - 2 cos(a, b).
        let cosine = 1.0 - ARCFACE_TOLERANCE * ARCFACE_TOLERANCE / 2.0;
        assert!((cosine - 0.395).abs() < 0.01, "cosine = {cosine}");
    }

    #[test]
    fn test_load_missing_models() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxFaceEncoder::load(dir.path()).err().unwrap();
        assert!(matches!(err, EncoderError::Detector(DetectorError::ModelNotFound(_))));
    }
}
