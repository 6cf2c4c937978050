use crate::engine::{EngineError, EngineHandle};
use facegate_core::api::{EnrollResponse, ErrorCode, ErrorResponse, VerifyResponse};
use facegate_core::{ScanMode, SubjectId, VerificationResult};
use serde::Serialize;
use zbus::interface;

/// Well-known bus name and object path of the daemon.
pub const BUS_NAME: &str = "org.facegate.Facegate1";
pub const OBJECT_PATH: &str = "/org/facegate/Facegate1";

/// Static facts reported by `Status()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub version: &'static str,
    pub threshold: f64,
    pub max_image_bytes: usize,
    pub db_path: String,
    pub model_path: String,
}

/// D-Bus interface for the Facegate template daemon.
///
/// Bus name: org.facegate.Facegate1
/// Object path: /org/facegate/Facegate1
///
/// Domain outcomes, failures included, come back as JSON bodies
/// (`VerifyResponse`, `EnrollResponse`, `IntegrityReport`, `ErrorResponse`).
/// D-Bus errors are reserved for a dead engine or invalid arguments.
pub struct FacegateService {
    engine: EngineHandle,
    status: StatusInfo,
}

impl FacegateService {
    pub fn new(engine: EngineHandle, status: StatusInfo) -> Self {
        Self { engine, status }
    }
}

#[interface(name = "org.facegate.Facegate1")]
impl FacegateService {
    /// Enroll (or re-enroll) a subject from an aligned face crop.
    async fn enroll(&self, subject_id: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        let subject = SubjectId::new(subject_id);
        tracing::info!(subject = %subject, bytes = image.len(), "enroll requested");
        let result = self.engine.enroll(subject.clone(), image).await;
        enroll_body(&subject, result)
    }

    /// Verify a face crop against the subject's template at the configured threshold.
    async fn verify(&self, subject_id: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        let subject = SubjectId::new(subject_id);
        tracing::info!(subject = %subject, bytes = image.len(), "verify requested");
        let result = self.engine.verify(subject.clone(), image, None).await;
        verify_body(&subject, result)
    }

    /// Verify with a caller-chosen threshold in [-1, 1].
    async fn verify_with_threshold(
        &self,
        subject_id: &str,
        image: Vec<u8>,
        threshold: f64,
    ) -> zbus::fdo::Result<String> {
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "threshold {threshold} outside [-1, 1]"
            )));
        }
        let subject = SubjectId::new(subject_id);
        tracing::info!(subject = %subject, threshold, "verify requested");
        let result = self.engine.verify(subject.clone(), image, Some(threshold)).await;
        verify_body(&subject, result)
    }

    /// Scan all stored templates; repair or clear corrupted ones unless `dry_run`.
    async fn repair(&self, dry_run: bool) -> zbus::fdo::Result<String> {
        let mode = if dry_run {
            ScanMode::DryRun
        } else {
            ScanMode::Repair
        };
        tracing::info!(?mode, "repair requested");
        match self.engine.scan(mode).await {
            Ok(report) => to_json(&report),
            Err(EngineError::Scan(e)) => to_json(&ErrorResponse::from_scan_error(&e)),
            Err(e) => Err(engine_failure(e)),
        }
    }

    /// Report `absent`, `valid` or `corrupted` for a subject.
    async fn template_state(&self, subject_id: &str) -> zbus::fdo::Result<String> {
        let state = self
            .engine
            .template_state(SubjectId::new(subject_id))
            .await
            .map_err(engine_failure)?;
        Ok(state.to_string())
    }

    /// Remove a subject's template. Returns whether one existed.
    async fn remove_template(&self, subject_id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(subject = subject_id, "remove requested");
        self.engine
            .remove(SubjectId::new(subject_id))
            .await
            .map_err(engine_failure)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        to_json(&self.status)
    }
}

fn enroll_body(subject: &SubjectId, result: Result<(), EngineError>) -> zbus::fdo::Result<String> {
    match result {
        Ok(()) => to_json(&EnrollResponse {
            success: true,
            subject_id: subject.clone(),
        }),
        Err(EngineError::Enroll(e)) => to_json(&ErrorResponse::from_enroll_error(subject, &e)),
        Err(e) => Err(engine_failure(e)),
    }
}

fn verify_body(
    subject: &SubjectId,
    result: Result<VerificationResult, EngineError>,
) -> zbus::fdo::Result<String> {
    match result {
        Ok(result) => to_json(&VerifyResponse::from(&result)),
        Err(EngineError::Verify(e)) => to_json(&ErrorResponse::from_verify_error(subject, &e)),
        Err(e) => Err(engine_failure(e)),
    }
}

/// Failures with no domain body: the store behind a state query or removal,
/// or the engine itself.
fn engine_failure(e: EngineError) -> zbus::fdo::Error {
    match e {
        EngineError::Store(e) => {
            tracing::warn!(error = %e, "template store failure");
            let body = ErrorResponse::new(ErrorCode::StoreUnavailable, e.to_string(), None);
            zbus::fdo::Error::Failed(serde_json::to_string(&body).unwrap_or_else(|_| e.to_string()))
        }
        other => {
            tracing::error!(error = %other, "engine unavailable");
            zbus::fdo::Error::Failed(other.to_string())
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::{EnrollError, ExtractionError, VerifyError};

    fn parse(body: zbus::fdo::Result<String>) -> serde_json::Value {
        serde_json::from_str(&body.unwrap()).unwrap()
    }

    #[test]
    fn test_enroll_success_body() {
        let json = parse(enroll_body(&SubjectId::new("E1"), Ok(())));
        assert_eq!(json["success"], true);
        assert_eq!(json["subjectId"], "E1");
    }

    #[test]
    fn test_enroll_error_body() {
        let err = EngineError::Enroll(EnrollError::ExtractionFailed(ExtractionError::EmptyImage));
        let json = parse(enroll_body(&SubjectId::new("E1"), Err(err)));
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "EXTRACTION_FAILED");
    }

    #[test]
    fn test_verify_success_body() {
        let result = VerificationResult {
            verified: true,
            similarity_score: 0.99996,
            threshold: 0.75,
            subject_id: SubjectId::new("E1"),
            timestamp: chrono::Utc::now(),
        };
        let json = parse(verify_body(&SubjectId::new("E1"), Ok(result)));
        assert_eq!(json["verified"], true);
        assert_eq!(json["similarityScore"], "1.0000");
        assert_eq!(json["threshold"], 0.75);
    }

    #[test]
    fn test_verify_no_template_body() {
        let id = SubjectId::new("E1");
        let err = EngineError::Verify(VerifyError::NoTemplate(id.clone()));
        let json = parse(verify_body(&id, Err(err)));
        assert_eq!(json["code"], "NO_TEMPLATE");
        assert_eq!(json["requiresEnrollment"], true);
    }

    #[test]
    fn test_dead_engine_is_a_dbus_error() {
        let result = verify_body(&SubjectId::new("E1"), Err(EngineError::ChannelClosed));
        assert!(matches!(result, Err(zbus::fdo::Error::Failed(_))));
    }
}
