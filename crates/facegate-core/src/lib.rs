//! facegate-core — Biometric template engine.
//!
//! Stores one 512-dimensional face descriptor per subject as base64 text,
//! verifies live captures against it by cosine similarity, and detects and
//! repairs corrupted stored descriptors. Feature extraction and persistence
//! are consumed through the [`FeatureExtractor`] and [`TemplateStore`] traits.

pub mod api;
pub mod codec;
pub mod extractor;
pub mod scanner;
pub mod similarity;
pub mod store;
pub mod types;
pub mod workflow;

pub use codec::CodecError;
pub use extractor::{ExtractionError, FeatureExtractor};
pub use scanner::{IntegrityScanner, ScanError, ScanMode};
pub use similarity::SimilarityError;
pub use store::{StoreError, TemplateStore};
pub use types::{
    BiometricTemplate, DimensionError, EncodedForm, Embedding, IntegrityReport, SubjectId,
    TemplateState, VerificationResult, EMBEDDING_DIM,
};
pub use workflow::{
    EnrollError, VerificationWorkflow, VerifyError, WorkflowConfig, DEFAULT_MAX_IMAGE_BYTES,
    DEFAULT_THRESHOLD,
};
