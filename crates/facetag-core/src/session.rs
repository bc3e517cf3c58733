//! Per-frame recognition: downscale, detect, encode, match, rescale.

use crate::encoder::{EncoderError, FaceEncoder};
use crate::matcher::{Matcher, NearestNeighborMatcher};
use crate::reconcile::{self, ResizeFactor};
use crate::store::{DescriptorStore, StoreError};
use crate::types::{DetectedRegion, MatchResult};
use image::imageops::{self, FilterType};
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
}

/// Owns everything needed to label the faces of a frame.
///
/// Holds no per-frame state; the store only changes through
/// [`load_references`](Self::load_references) and
/// [`add_reference_image`](Self::add_reference_image).
pub struct RecognitionSession<E> {
    encoder: E,
    store: DescriptorStore,
    matcher: NearestNeighborMatcher,
    factor: ResizeFactor,
}

impl<E: FaceEncoder> RecognitionSession<E> {
    /// Create a session with an empty store, using the encoder's own tolerance.
    pub fn new(encoder: E, factor: ResizeFactor) -> Self {
        let tolerance = encoder.tolerance();
        Self::with_tolerance(encoder, factor, tolerance)
    }

    pub fn with_tolerance(encoder: E, factor: ResizeFactor, tolerance: f32) -> Self {
        tracing::debug!(%factor, tolerance, "recognition session created");
        Self {
            encoder,
            store: DescriptorStore::new(),
            matcher: NearestNeighborMatcher::new(tolerance),
            factor,
        }
    }

    pub fn store(&self) -> &DescriptorStore {
        &self.store
    }

    pub fn factor(&self) -> ResizeFactor {
        self.factor
    }

    pub fn tolerance(&self) -> f32 {
        self.matcher.tolerance()
    }

    /// Register all reference images at `path`; see [`DescriptorStore::load`].
    pub fn load_references(&mut self, path: &Path) -> Result<usize, StoreError> {
        self.store.load(path, &mut self.encoder)
    }

    /// Copy one image into `images_dir` and register it.
    pub fn add_reference_image(
        &mut self,
        source: &Path,
        images_dir: &Path,
    ) -> Result<PathBuf, StoreError> {
        self.store.add_reference_image(source, images_dir, &mut self.encoder)
    }

    /// Label every face in `frame`, with regions in `frame`'s coordinates.
    ///
    /// Returns nothing without touching the encoder when `enabled` is false.
    /// Results follow the detector's output order.
    pub fn process(
        &mut self,
        frame: &GrayImage,
        enabled: bool,
    ) -> Result<Vec<MatchResult>, SessionError> {
        if !enabled {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let (width, height) =
            reconcile::resized_dimensions(frame.width(), frame.height(), self.factor);
        let small = imageops::resize(frame, width, height, FilterType::Triangle);

        let faces = self.encoder.detect_faces(&small)?;
        if faces.is_empty() {
            return Ok(Vec::new());
        }
        let descriptors = self.encoder.encode_faces(&small, &faces)?;
        if descriptors.len() != faces.len() {
            tracing::warn!(
                faces = faces.len(),
                descriptors = descriptors.len(),
                "encoder returned a different number of descriptors than faces"
            );
        }

        let identities: Vec<_> = descriptors
            .iter()
            .map(|descriptor| self.matcher.identify(descriptor, &self.store))
            .collect();

        // Rescaling is the last step, after every label is settled.
        let results: Vec<MatchResult> = faces
            .iter()
            .zip(identities)
            .map(|(face, identity)| MatchResult {
                region: reconcile::rescale(
                    DetectedRegion::from_bbox(face, width, height),
                    self.factor,
                ),
                identity,
            })
            .collect();

        tracing::debug!(
            faces = results.len(),
            known = results.iter().filter(|r| r.identity.is_known()).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "frame processed"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;
    use crate::store::tests::{write_face_png, RowEncoder};
    use crate::types::{BoundingBox, FaceDescriptor, Identity};
    use image::Luma;

    /// Scripted encoder returning fixed boxes/descriptors and counting calls.
    struct ScriptedEncoder {
        faces: Vec<BoundingBox>,
        descriptors: Vec<FaceDescriptor>,
        calls: usize,
        seen_size: Option<(u32, u32)>,
    }

    impl ScriptedEncoder {
        fn new(faces: Vec<BoundingBox>, descriptors: Vec<Vec<f32>>) -> Self {
            Self {
                faces,
                descriptors: descriptors.into_iter().map(FaceDescriptor::new).collect(),
                calls: 0,
                seen_size: None,
            }
        }
    }

    impl FaceEncoder for ScriptedEncoder {
        fn detect_faces(&mut self, image: &GrayImage) -> Result<Vec<BoundingBox>, EncoderError> {
            self.calls += 1;
            self.seen_size = Some(image.dimensions());
            Ok(self.faces.clone())
        }

        fn encode_faces(
            &mut self,
            _image: &GrayImage,
            faces: &[BoundingBox],
        ) -> Result<Vec<FaceDescriptor>, EncoderError> {
            Ok(self.descriptors.iter().take(faces.len()).cloned().collect())
        }
    }

    struct FailingEncoder;

    impl FaceEncoder for FailingEncoder {
        fn detect_faces(&mut self, _image: &GrayImage) -> Result<Vec<BoundingBox>, EncoderError> {
            Err(DetectorError::InferenceFailed("boom".into()).into())
        }

        fn encode_faces(
            &mut self,
            _image: &GrayImage,
            _faces: &[BoundingBox],
        ) -> Result<Vec<FaceDescriptor>, EncoderError> {
            Ok(Vec::new())
        }
    }

    fn bbox(top: f32, right: f32, bottom: f32, left: f32) -> BoundingBox {
        BoundingBox {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
            confidence: 0.9,
            landmarks: None,
        }
    }

    fn frame() -> GrayImage {
        GrayImage::from_pixel(640, 480, Luma([90]))
    }

    #[test]
    fn test_disabled_does_no_work() {
        let encoder = ScriptedEncoder::new(vec![bbox(1.0, 2.0, 3.0, 0.0)], vec![vec![0.0]]);
        let mut session = RecognitionSession::new(encoder, ResizeFactor::default());
        session.store.push("alice", FaceDescriptor::new(vec![0.0]));

        assert!(session.process(&frame(), false).unwrap().is_empty());
        assert_eq!(session.encoder.calls, 0);
    }

    #[test]
    fn test_detects_on_downscaled_frame_and_rescales() {
        let encoder = ScriptedEncoder::new(
            vec![bbox(10.0, 50.0, 40.0, 5.0), bbox(60.0, 120.0, 100.0, 80.0)],
            vec![vec![0.1, 0.0], vec![0.9, 0.0]],
        );
        let mut session = RecognitionSession::with_tolerance(encoder, ResizeFactor::default(), 0.6);
        session.store.push("alice", FaceDescriptor::new(vec![0.0, 0.0]));

        let results = session.process(&frame(), true).unwrap();

        assert_eq!(session.encoder.seen_size, Some((160, 120)));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].region, DetectedRegion::new(40, 200, 160, 20));
        assert_eq!(results[0].identity, Identity::Known("alice".into()));
        // Second face is 0.9 away from alice and lies in detector order.
        assert_eq!(results[1].region, DetectedRegion::new(240, 480, 400, 320));
        assert_eq!(results[1].identity, Identity::Unknown);
    }

    #[test]
    fn test_empty_store_reports_unknown() {
        let encoder = ScriptedEncoder::new(vec![bbox(0.0, 10.0, 10.0, 0.0)], vec![vec![0.0]]);
        let mut session = RecognitionSession::new(encoder, ResizeFactor::default());

        let results = session.process(&frame(), true).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity, Identity::Unknown);
    }

    #[test]
    fn test_short_descriptor_list_pairs_prefix() {
        let encoder = ScriptedEncoder::new(
            vec![bbox(0.0, 10.0, 10.0, 0.0), bbox(20.0, 30.0, 30.0, 20.0)],
            vec![vec![0.0]],
        );
        let mut session = RecognitionSession::new(encoder, ResizeFactor::default());
        assert_eq!(session.process(&frame(), true).unwrap().len(), 1);
    }

    #[test]
    fn test_encoder_error_propagates() {
        let mut session = RecognitionSession::new(FailingEncoder, ResizeFactor::default());
        let err = session.process(&frame(), true).unwrap_err();
        assert!(matches!(err, SessionError::Encoder(EncoderError::Detector(_))));
    }

    #[test]
    fn test_references_then_live_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_face_png(&dir.path().join("alice.png"), &[255]);
        write_face_png(&dir.path().join("bob.png"), &[40]);

        let factor = ResizeFactor::new(1.0).unwrap();
        let mut session = RecognitionSession::with_tolerance(RowEncoder, factor, 0.1);
        assert_eq!(session.load_references(dir.path()).unwrap(), 2);

        // Row 0 is bright: matches alice exactly. Row 2 (value 140) is far from both.
        let mut live = GrayImage::new(8, 4);
        live.put_pixel(0, 0, Luma([255]));
        live.put_pixel(0, 2, Luma([140]));

        let results = session.process(&live, true).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.identity.name()).collect();
        assert_eq!(names, vec!["alice", "unknown"]);
        assert_eq!(results[1].region, DetectedRegion::new(2, 8, 3, 0));
    }

    #[test]
    fn test_add_reference_image_between_frames() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("carol.png");
        write_face_png(&source, &[200]);

        let factor = ResizeFactor::new(1.0).unwrap();
        let mut session = RecognitionSession::with_tolerance(RowEncoder, factor, 0.05);
        let mut live = GrayImage::new(4, 4);
        live.put_pixel(0, 1, Luma([200]));

        assert_eq!(session.process(&live, true).unwrap()[0].identity, Identity::Unknown);
        session.add_reference_image(&source, &dir.path().join("refs")).unwrap();
        assert_eq!(
            session.process(&live, true).unwrap()[0].identity,
            Identity::Known("carol".into())
        );
    }
}
