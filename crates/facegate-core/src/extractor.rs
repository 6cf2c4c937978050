//! Feature extraction seam.
//!
//! Turning an image into a descriptor is an external capability: a trained
//! model, a heuristic, or a test double all fit behind [`FeatureExtractor`].

use crate::types::{DimensionError, Embedding};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("image is empty")]
    EmptyImage,
    #[error("image is {size} bytes, limit is {limit}")]
    ImageTooLarge { size: usize, limit: usize },
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("extractor output: {0}")]
    Dimension(#[from] DimensionError),
    #[error("degenerate descriptor: {0}")]
    DegenerateVector(&'static str),
}

/// Produces a fixed-length descriptor from raw image bytes.
pub trait FeatureExtractor {
    fn extract(&self, image: &[u8]) -> Result<Embedding, ExtractionError>;
}

impl<T: FeatureExtractor + ?Sized> FeatureExtractor for Box<T> {
    fn extract(&self, image: &[u8]) -> Result<Embedding, ExtractionError> {
        (**self).extract(image)
    }
}

impl<T: FeatureExtractor + ?Sized> FeatureExtractor for std::sync::Arc<T> {
    fn extract(&self, image: &[u8]) -> Result<Embedding, ExtractionError> {
        (**self).extract(image)
    }
}
