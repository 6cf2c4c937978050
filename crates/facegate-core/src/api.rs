//! Response bodies handed to the outer transport.
//!
//! Transport-agnostic: the daemon serializes these to JSON over D-Bus, an
//! HTTP front end can return them unchanged.

use crate::scanner::ScanError;
use crate::types::{SubjectId, VerificationResult};
use crate::workflow::{EnrollError, VerifyError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub verified: bool,
    /// Similarity formatted to 4 decimal places.
    pub similarity_score: String,
    pub threshold: f64,
    pub subject_id: SubjectId,
    pub timestamp: DateTime<Utc>,
}

impl From<&VerificationResult> for VerifyResponse {
    fn from(result: &VerificationResult) -> Self {
        Self {
            verified: result.verified,
            similarity_score: format!("{:.4}", result.similarity_score),
            threshold: result.threshold,
            subject_id: result.subject_id.clone(),
            timestamp: result.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    pub success: bool,
    pub subject_id: SubjectId,
}

/// Stable machine-readable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    ExtractionFailed,
    NoTemplate,
    TemplateCorrupted,
    EncodingSelfCheckFailed,
    StoreUnavailable,
}

impl ErrorCode {
    /// What the caller should do next.
    pub fn action(self) -> Option<&'static str> {
        match self {
            Self::InvalidRequest => None,
            Self::ExtractionFailed => {
                Some("retry with a clear, well-lit image with the face unobscured")
            }
            Self::NoTemplate => Some("register the subject's face first"),
            Self::TemplateCorrupted => Some("re-register the subject's face"),
            Self::EncodingSelfCheckFailed | Self::StoreUnavailable => Some("retry later"),
        }
    }

    /// Whether the subject has to go through enrollment before verifying.
    pub fn requires_enrollment(self) -> bool {
        matches!(self, Self::NoTemplate | Self::TemplateCorrupted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub code: ErrorCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub requires_enrollment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<SubjectId>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, error: impl Into<String>, subject_id: Option<SubjectId>) -> Self {
        Self {
            success: false,
            code,
            error: error.into(),
            action: code.action().map(str::to_string),
            requires_enrollment: code.requires_enrollment(),
            subject_id,
            timestamp: Utc::now(),
        }
    }

    pub fn from_enroll_error(subject_id: &SubjectId, err: &EnrollError) -> Self {
        let code = match err {
            EnrollError::InvalidSubject => ErrorCode::InvalidRequest,
            EnrollError::ExtractionFailed(_) => ErrorCode::ExtractionFailed,
            EnrollError::EncodingSelfCheckFailed => ErrorCode::EncodingSelfCheckFailed,
            EnrollError::Store(_) => ErrorCode::StoreUnavailable,
        };
        Self::new(code, err.to_string(), Some(subject_id.clone()))
    }

    pub fn from_verify_error(subject_id: &SubjectId, err: &VerifyError) -> Self {
        let code = match err {
            VerifyError::InvalidSubject => ErrorCode::InvalidRequest,
            VerifyError::ExtractionFailed(_) => ErrorCode::ExtractionFailed,
            VerifyError::NoTemplate(_) => ErrorCode::NoTemplate,
            VerifyError::TemplateCorrupted { .. } => ErrorCode::TemplateCorrupted,
            VerifyError::Store(_) => ErrorCode::StoreUnavailable,
        };
        Self::new(code, err.to_string(), Some(subject_id.clone()))
    }

    pub fn from_scan_error(err: &ScanError) -> Self {
        Self::new(ErrorCode::StoreUnavailable, err.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractionError;

    fn result(score: f64) -> VerificationResult {
        VerificationResult {
            verified: score >= 0.75,
            similarity_score: score,
            threshold: 0.75,
            subject_id: SubjectId::new("E1"),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_similarity_score_four_decimals() {
        assert_eq!(VerifyResponse::from(&result(1.0)).similarity_score, "1.0000");
        assert_eq!(VerifyResponse::from(&result(0.0)).similarity_score, "0.0000");
        assert_eq!(VerifyResponse::from(&result(0.123456)).similarity_score, "0.1235");
        assert_eq!(VerifyResponse::from(&result(-0.5)).similarity_score, "-0.5000");
    }

    #[test]
    fn test_verify_response_field_names() {
        let json = serde_json::to_value(VerifyResponse::from(&result(0.8))).unwrap();
        assert_eq!(json["verified"], true);
        assert_eq!(json["similarityScore"], "0.8000");
        assert_eq!(json["threshold"], 0.75);
        assert_eq!(json["subjectId"], "E1");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_no_template_and_corrupted_are_distinct_codes() {
        let id = SubjectId::new("E1");
        let absent = ErrorResponse::from_verify_error(&id, &VerifyError::NoTemplate(id.clone()));
        let corrupted = ErrorResponse::from_verify_error(
            &id,
            &VerifyError::TemplateCorrupted {
                subject_id: id.clone(),
                reason: "bad".into(),
            },
        );
        assert_eq!(absent.code, ErrorCode::NoTemplate);
        assert_eq!(corrupted.code, ErrorCode::TemplateCorrupted);
        assert_ne!(absent.action, corrupted.action);
        assert!(absent.requires_enrollment && corrupted.requires_enrollment);
    }

    #[test]
    fn test_error_code_serialization() {
        let id = SubjectId::new("E1");
        let body = ErrorResponse::from_enroll_error(
            &id,
            &EnrollError::ExtractionFailed(ExtractionError::EmptyImage),
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "EXTRACTION_FAILED");
        assert_eq!(json["requiresEnrollment"], false);
    }
}
