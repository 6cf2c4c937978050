use crate::codec::{self, CodecError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of components in every face descriptor.
pub const EMBEDDING_DIM: usize = 512;

/// Opaque identifier of the subject a template belongs to.
///
/// The subject record itself (an employee) lives outside this crate; a
/// template only refers to it by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SubjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("expected {EMBEDDING_DIM} components, got {0}")]
pub struct DimensionError(pub usize);

/// Face descriptor of exactly [`EMBEDDING_DIM`] components.
///
/// The length is part of the type, so two embeddings can always be compared
/// without a runtime dimension check.
#[derive(Clone, PartialEq)]
pub struct Embedding {
    values: Box<[f32; EMBEDDING_DIM]>,
}

impl Embedding {
    pub fn new(values: [f32; EMBEDDING_DIM]) -> Self {
        Self {
            values: Box::new(values),
        }
    }

    /// Build an embedding by evaluating `f` at every component index.
    pub fn from_fn(mut f: impl FnMut(usize) -> f32) -> Self {
        let mut values = Box::new([0.0f32; EMBEDDING_DIM]);
        for (i, v) in values.iter_mut().enumerate() {
            *v = f(i);
        }
        Self { values }
    }

    pub fn values(&self) -> &[f32; EMBEDDING_DIM] {
        &self.values
    }

    /// Euclidean norm, accumulated in f64.
    pub fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|&v| f64::from(v) * f64::from(v))
            .sum::<f64>()
            .sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Bit-for-bit equality. Unlike `==`, treats identical NaN payloads as
    /// equal and distinguishes `0.0` from `-0.0`.
    pub fn bit_eq(&self, other: &Embedding) -> bool {
        self.values
            .iter()
            .zip(other.values.iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl fmt::Debug for Embedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedding")
            .field("dim", &EMBEDDING_DIM)
            .field("norm", &self.norm())
            .field("head", &&self.values[..4])
            .finish()
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = DimensionError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        let len = values.len();
        let values: Box<[f32; EMBEDDING_DIM]> = values
            .into_boxed_slice()
            .try_into()
            .map_err(|_| DimensionError(len))?;
        Ok(Self { values })
    }
}

/// Canonical textual persistence form of an [`Embedding`] (base64).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedForm(String);

impl EncodedForm {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// A blank stored form carries no template at all.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EncodedForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage state of one subject's template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateState {
    /// Nothing stored.
    Absent,
    /// Stored form decodes cleanly to a finite, non-zero vector.
    Valid,
    /// Stored form fails to decode under the current codec rules, or decodes
    /// to a vector that cannot be scored (zero magnitude, NaN or infinity).
    Corrupted,
}

impl fmt::Display for TemplateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Valid => "valid",
            Self::Corrupted => "corrupted",
        })
    }
}

/// An enrolled descriptor together with its persisted encoding.
#[derive(Debug, Clone)]
pub struct BiometricTemplate {
    pub subject_id: SubjectId,
    pub embedding: Embedding,
    pub encoded: EncodedForm,
}

impl BiometricTemplate {
    /// Encode a freshly extracted embedding.
    pub fn new(subject_id: SubjectId, embedding: Embedding) -> Self {
        let encoded = codec::encode(&embedding);
        Self {
            subject_id,
            embedding,
            encoded,
        }
    }

    /// Rebuild a template from its stored form.
    pub fn decode(subject_id: SubjectId, encoded: EncodedForm) -> Result<Self, CodecError> {
        let embedding = codec::decode(&encoded)?;
        Ok(Self {
            subject_id,
            embedding,
            encoded,
        })
    }
}

/// Outcome of one verification call. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verified: bool,
    /// Cosine similarity in [-1, 1].
    pub similarity_score: f64,
    pub threshold: f64,
    pub subject_id: SubjectId,
    pub timestamp: DateTime<Utc>,
}

/// Summary of one integrity scan run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub scanned: usize,
    pub fixed: usize,
    pub cleared: usize,
    /// Subjects whose template was fixed or cleared, in scan order.
    pub affected: Vec<SubjectId>,
    /// Set when the scan only reported and wrote nothing.
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_try_from_wrong_length() {
        let err = Embedding::try_from(vec![1.0; 128]).unwrap_err();
        assert_eq!(err, DimensionError(128));
    }

    #[test]
    fn test_embedding_try_from_exact_length() {
        let e = Embedding::try_from(vec![0.5; EMBEDDING_DIM]).unwrap();
        assert_eq!(e.values()[EMBEDDING_DIM - 1], 0.5);
    }

    #[test]
    fn test_embedding_norm() {
        let e = Embedding::from_fn(|i| match i {
            0 => 3.0,
            1 => 4.0,
            _ => 0.0,
        });
        assert!((e.norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_bit_eq_distinguishes_signed_zero() {
        let a = Embedding::from_fn(|_| 0.0);
        let b = Embedding::from_fn(|i| if i == 7 { -0.0 } else { 0.0 });
        assert_eq!(a, b);
        assert!(!a.bit_eq(&b));
    }

    #[test]
    fn test_blank_ids_and_forms() {
        assert!(SubjectId::new("  ").is_blank());
        assert!(!SubjectId::new("E1").is_blank());
        assert!(EncodedForm::new("\n\t").is_blank());
    }

    #[test]
    fn test_template_state_serializes_snake_case() {
        let json = serde_json::to_string(&TemplateState::Corrupted).unwrap();
        assert_eq!(json, "\"corrupted\"");
    }
}
