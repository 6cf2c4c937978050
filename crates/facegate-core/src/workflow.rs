//! Enrollment and verification against stored templates.
//!
//! The workflow is stateless between calls: everything it knows about a
//! subject comes from the [`TemplateStore`]. Codec and similarity failures
//! never leave this module; they are mapped to [`EnrollError`] or
//! [`VerifyError`] first.

use crate::codec;
use crate::extractor::{ExtractionError, FeatureExtractor};
use crate::similarity::{self, SimilarityError};
use crate::store::{StoreError, TemplateStore};
use crate::types::{BiometricTemplate, Embedding, SubjectId, TemplateState, VerificationResult};
use chrono::Utc;
use thiserror::Error;

/// Similarity a live capture must reach to count as the enrolled subject.
pub const DEFAULT_THRESHOLD: f64 = 0.75;
/// Largest image accepted for extraction (5 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("subject id must not be blank")]
    InvalidSubject,
    #[error("feature extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),
    #[error("encoded template failed its round-trip check; nothing was stored")]
    EncodingSelfCheckFailed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("subject id must not be blank")]
    InvalidSubject,
    #[error("feature extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),
    #[error("no template enrolled for subject {0}")]
    NoTemplate(SubjectId),
    #[error("stored template for subject {subject_id} is corrupted: {reason}")]
    TemplateCorrupted { subject_id: SubjectId, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowConfig {
    /// Default decision threshold for [`VerificationWorkflow::verify_image`].
    pub threshold: f64,
    pub max_image_bytes: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// Enroll / verify orchestration over an injected store and extractor.
pub struct VerificationWorkflow<S, E> {
    store: S,
    extractor: E,
    config: WorkflowConfig,
}

impl<S: TemplateStore, E: FeatureExtractor> VerificationWorkflow<S, E> {
    pub fn new(store: S, extractor: E, config: WorkflowConfig) -> Self {
        Self {
            store,
            extractor,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Validate the image and run the extractor on it.
    pub fn extract(&self, image: &[u8]) -> Result<Embedding, ExtractionError> {
        if image.is_empty() {
            return Err(ExtractionError::EmptyImage);
        }
        if image.len() > self.config.max_image_bytes {
            return Err(ExtractionError::ImageTooLarge {
                size: image.len(),
                limit: self.config.max_image_bytes,
            });
        }
        self.extractor.extract(image)
    }

    /// Store `live` as the subject's template, replacing any previous one.
    ///
    /// The encoded form is decoded again and compared bit for bit before it
    /// is written; a form that does not reproduce `live` is never persisted.
    pub fn enroll(&self, subject_id: &SubjectId, live: &Embedding) -> Result<(), EnrollError> {
        if subject_id.is_blank() {
            return Err(EnrollError::InvalidSubject);
        }
        check_usable(live)?;

        let template = BiometricTemplate::new(subject_id.clone(), live.clone());
        match codec::decode(&template.encoded) {
            Ok(decoded) if decoded.bit_eq(live) => {}
            Ok(_) => {
                tracing::error!(subject = %subject_id, "encoded template decodes to different values");
                return Err(EnrollError::EncodingSelfCheckFailed);
            }
            Err(e) => {
                tracing::error!(subject = %subject_id, error = %e, "encoded template does not decode");
                return Err(EnrollError::EncodingSelfCheckFailed);
            }
        }

        self.store.put(subject_id, &template.encoded)?;
        tracing::info!(subject = %subject_id, "template enrolled");
        Ok(())
    }

    /// Extract a descriptor from `image` and enroll it.
    pub fn enroll_image(&self, subject_id: &SubjectId, image: &[u8]) -> Result<(), EnrollError> {
        if subject_id.is_blank() {
            return Err(EnrollError::InvalidSubject);
        }
        let live = self.extract(image)?;
        self.enroll(subject_id, &live)
    }

    /// Compare `live` against the subject's stored template. Read-only.
    pub fn verify(
        &self,
        subject_id: &SubjectId,
        live: &Embedding,
        threshold: f64,
    ) -> Result<VerificationResult, VerifyError> {
        let stored = self.load(subject_id)?;
        self.compare(subject_id, &stored, live, threshold)
    }

    /// Extract a descriptor from `image` and verify it. Uses the configured
    /// threshold when `threshold` is `None`.
    ///
    /// The stored template is checked before extraction runs, so a subject
    /// with nothing usable on file fails fast.
    pub fn verify_image(
        &self,
        subject_id: &SubjectId,
        image: &[u8],
        threshold: Option<f64>,
    ) -> Result<VerificationResult, VerifyError> {
        let stored = self.load(subject_id)?;
        let live = self.extract(image)?;
        let threshold = threshold.unwrap_or(self.config.threshold);
        self.compare(subject_id, &stored, &live, threshold)
    }

    /// Classify what is on file for a subject without modifying it.
    pub fn template_state(&self, subject_id: &SubjectId) -> Result<TemplateState, StoreError> {
        Ok(match self.store.get(subject_id)? {
            None => TemplateState::Absent,
            Some(encoded) if encoded.is_blank() => TemplateState::Absent,
            Some(encoded) => match codec::decode(&encoded) {
                Ok(stored) if similarity::check_scorable(&stored).is_ok() => TemplateState::Valid,
                _ => TemplateState::Corrupted,
            },
        })
    }

    /// Drop the subject's template. Returns whether one was on file.
    pub fn remove(&self, subject_id: &SubjectId) -> Result<bool, StoreError> {
        let existed = self
            .store
            .get(subject_id)?
            .is_some_and(|encoded| !encoded.is_blank());
        self.store.clear(subject_id)?;
        if existed {
            tracing::info!(subject = %subject_id, "template removed");
        }
        Ok(existed)
    }

    fn load(&self, subject_id: &SubjectId) -> Result<Embedding, VerifyError> {
        if subject_id.is_blank() {
            return Err(VerifyError::InvalidSubject);
        }

        let encoded = match self.store.get(subject_id)? {
            Some(encoded) if !encoded.is_blank() => encoded,
            _ => {
                tracing::info!(subject = %subject_id, "verify: no template on file");
                return Err(VerifyError::NoTemplate(subject_id.clone()));
            }
        };

        let corrupted = |reason: String| {
            tracing::warn!(subject = %subject_id, error = %reason, "verify: stored template is corrupted");
            VerifyError::TemplateCorrupted {
                subject_id: subject_id.clone(),
                reason,
            }
        };
        let stored = codec::decode(&encoded).map_err(|e| corrupted(e.to_string()))?;
        similarity::check_scorable(&stored).map_err(|e| corrupted(e.to_string()))?;
        Ok(stored)
    }

    fn compare(
        &self,
        subject_id: &SubjectId,
        stored: &Embedding,
        live: &Embedding,
        threshold: f64,
    ) -> Result<VerificationResult, VerifyError> {
        check_usable(live)?;

        // Both sides are checked by now; anything left is on the stored side.
        let score = similarity::score(stored, live).map_err(|e| VerifyError::TemplateCorrupted {
            subject_id: subject_id.clone(),
            reason: e.to_string(),
        })?;
        let verified = similarity::decide(score, threshold);

        tracing::info!(
            subject = %subject_id,
            similarity = score,
            threshold,
            verified,
            "verify: compared"
        );

        Ok(VerificationResult {
            verified,
            similarity_score: score,
            threshold,
            subject_id: subject_id.clone(),
            timestamp: Utc::now(),
        })
    }
}

/// Reject descriptors that could never be scored.
fn check_usable(live: &Embedding) -> Result<(), ExtractionError> {
    similarity::check_scorable(live).map_err(|e| match e {
        SimilarityError::NonFinite => ExtractionError::DegenerateVector("non-finite component"),
        SimilarityError::ZeroNorm => ExtractionError::DegenerateVector("zero magnitude"),
    })
}
