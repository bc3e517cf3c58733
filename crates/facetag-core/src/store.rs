//! Registered reference faces.
//!
//! The store only grows: entries are appended in load order and that order is
//! the matcher's tie-break. Reloading means building a fresh store.

use crate::encoder::{EncoderError, FaceEncoder};
use crate::types::{FaceDescriptor, NamedDescriptor};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no face found in reference image {0}")]
    NoFaceFound(PathBuf),
    #[error("reference image path does not exist or is not a regular file: {0}")]
    InvalidFilePath(PathBuf),
    #[error("reference path not found: {0}")]
    InvalidPath(PathBuf),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("encoder failed on {path}: {source}")]
    Encoder {
        path: PathBuf,
        #[source]
        source: EncoderError,
    },
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered collection of (name, descriptor) pairs.
#[derive(Debug, Clone, Default)]
pub struct DescriptorStore {
    entries: Vec<NamedDescriptor>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, descriptor: FaceDescriptor) {
        self.entries.push(NamedDescriptor {
            name: name.into(),
            descriptor,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[NamedDescriptor] {
        &self.entries
    }

    /// Distinct names in first-registered order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.name.as_str()) {
                names.push(&entry.name);
            }
        }
        names
    }

    /// Register every image found at `path` and return how many were added.
    ///
    /// A directory is scanned non-recursively for files with an extension, in
    /// sorted order; a file path registers just that file. Files that fail to
    /// decode or contain no face are logged and skipped.
    pub fn load<E>(&mut self, path: &Path, encoder: &mut E) -> Result<usize, StoreError>
    where
        E: FaceEncoder + ?Sized,
    {
        let candidates = reference_images(path)?;
        tracing::info!(path = %path.display(), found = candidates.len(), "reference images found");

        let mut loaded = 0;
        for image_path in &candidates {
            match encode_reference(image_path, encoder) {
                Ok((name, descriptor)) => {
                    tracing::debug!(
                        path = %image_path.display(),
                        name = %name,
                        "reference registered"
                    );
                    self.push(name, descriptor);
                    loaded += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        path = %image_path.display(),
                        error = %err,
                        "skipping reference image"
                    );
                }
            }
        }

        tracing::info!(
            loaded,
            skipped = candidates.len() - loaded,
            total = self.len(),
            "reference images loaded"
        );
        Ok(loaded)
    }

    /// Copy `source` into `images_dir` and register the copy.
    ///
    /// `source` is validated before anything is touched. Unlike a batch load,
    /// a face-less image is an error here.
    pub fn add_reference_image<E>(
        &mut self,
        source: &Path,
        images_dir: &Path,
        encoder: &mut E,
    ) -> Result<PathBuf, StoreError>
    where
        E: FaceEncoder + ?Sized,
    {
        if !source.is_file() {
            return Err(StoreError::InvalidFilePath(source.to_path_buf()));
        }
        let file_name = source
            .file_name()
            .ok_or_else(|| StoreError::InvalidFilePath(source.to_path_buf()))?;

        std::fs::create_dir_all(images_dir).map_err(|source| StoreError::Io {
            path: images_dir.to_path_buf(),
            source,
        })?;
        let destination = images_dir.join(file_name);
        // Re-adding a file already in the managed directory must not truncate it.
        if !same_file(source, &destination) {
            std::fs::copy(source, &destination).map_err(|source| StoreError::Io {
                path: destination.clone(),
                source,
            })?;
        }

        let (name, descriptor) = encode_reference(&destination, encoder)?;
        tracing::info!(path = %destination.display(), name = %name, "reference image added");
        self.push(name, descriptor);
        Ok(destination)
    }
}

/// Equivalent of a `path/*.*` glob, sorted.
fn reference_images(path: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(StoreError::InvalidPath(path.to_path_buf()));
    }

    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut images = Vec::new();
    for entry in std::fs::read_dir(path).map_err(io_err)? {
        let entry_path = entry.map_err(io_err)?.path();
        let hidden = entry_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if entry_path.is_file() && entry_path.extension().is_some() && !hidden {
            images.push(entry_path);
        }
    }
    images.sort();
    Ok(images)
}

/// Decode one reference image at full resolution and take its first face.
fn encode_reference<E>(path: &Path, encoder: &mut E) -> Result<(String, FaceDescriptor), StoreError>
where
    E: FaceEncoder + ?Sized,
{
    let image = image::open(path)
        .map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_luma8();

    let encoder_err = |source| StoreError::Encoder {
        path: path.to_path_buf(),
        source,
    };
    let faces = encoder.detect_faces(&image).map_err(encoder_err)?;
    if faces.len() > 1 {
        tracing::debug!(
            path = %path.display(),
            faces = faces.len(),
            "several faces in reference image, using the first"
        );
    }
    let descriptor = match faces.first() {
        Some(face) => encoder
            .encode_faces(&image, std::slice::from_ref(face))
            .map_err(encoder_err)?
            .into_iter()
            .next(),
        None => None,
    }
    .ok_or_else(|| StoreError::NoFaceFound(path.to_path_buf()))?;

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((name, descriptor))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
