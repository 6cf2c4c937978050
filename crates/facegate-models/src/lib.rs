//! facegate-models — ONNX Runtime face feature extractor.
//!
//! Produces 512-dimensional descriptors from a pre-aligned 112x112 8-bit
//! grayscale face crop. Detection and alignment happen upstream; this crate
//! only runs the recognition model.

use facegate_core::{Embedding, ExtractionError, FeatureExtractor, EMBEDDING_DIM};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

// --- Named constants ---
const INPUT_SIZE: usize = 112;
const INPUT_MEAN: f32 = 127.5;
const INPUT_STD: f32 = 127.5; // symmetric normalization to [-1, 1]
const CROP_BYTES: usize = INPUT_SIZE * INPUT_SIZE;

/// File name looked up in the model directory when none is configured.
pub const DEFAULT_MODEL_FILE: &str = "face_feature.onnx";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0} — place the recognition model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Recognition model wrapped as a [`FeatureExtractor`].
///
/// ONNX sessions need exclusive access per run, so the session sits behind
/// a mutex and `extract` can be called through a shared reference.
pub struct OnnxFeatureExtractor {
    session: Mutex<Session>,
    model_path: String,
}

impl OnnxFeatureExtractor {
    /// Load the recognition model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ModelError> {
        if !Path::new(model_path).exists() {
            return Err(ModelError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face feature model"
        );

        Ok(Self {
            session: Mutex::new(session),
            model_path: model_path.to_string(),
        })
    }

    pub fn model_path(&self) -> &str {
        &self.model_path
    }

    fn infer(&self, crop: &[u8]) -> Result<Vec<f32>, ModelError> {
        let input = preprocess(crop);

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceFailed("session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        Ok(raw_data.to_vec())
    }
}

impl FeatureExtractor for OnnxFeatureExtractor {
    fn extract(&self, image: &[u8]) -> Result<Embedding, ExtractionError> {
        check_crop(image)?;

        let raw = self
            .infer(image)
            .map_err(|e| ExtractionError::InferenceFailed(e.to_string()))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(ExtractionError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::try_from(l2_normalize(raw))?)
    }
}

/// The model consumes exactly one aligned grayscale crop.
fn check_crop(image: &[u8]) -> Result<(), ExtractionError> {
    if image.len() != CROP_BYTES {
        return Err(ExtractionError::UnsupportedImage(format!(
            "expected a {INPUT_SIZE}x{INPUT_SIZE} grayscale crop ({CROP_BYTES} bytes), got {} bytes",
            image.len()
        )));
    }
    Ok(())
}

/// Scale to unit length. A zero vector is returned unchanged; the workflow
/// rejects it.
fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}

/// Convert a 112x112 grayscale crop into a 1x3x112x112 NCHW float tensor.
fn preprocess(crop: &[u8]) -> Array4<f32> {
    let size = INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        for x in 0..size {
            let pixel = crop.get(y * size + x).copied().unwrap_or(0) as f32;
            let normalized = (pixel - INPUT_MEAN) / INPUT_STD;
            // Grayscale → 3 channels
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    tensor
}
