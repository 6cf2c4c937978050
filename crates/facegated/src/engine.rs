use facegate_core::{
    EnrollError, FeatureExtractor, IntegrityReport, IntegrityScanner, ScanError, ScanMode,
    StoreError, SubjectId, TemplateState, TemplateStore, VerificationResult, VerificationWorkflow,
    VerifyError,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        subject_id: SubjectId,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<(), EnrollError>>,
    },
    Verify {
        subject_id: SubjectId,
        image: Vec<u8>,
        threshold: Option<f64>,
        reply: oneshot::Sender<Result<VerificationResult, VerifyError>>,
    },
    Scan {
        mode: ScanMode,
        reply: oneshot::Sender<Result<IntegrityReport, ScanError>>,
    },
    State {
        subject_id: SubjectId,
        reply: oneshot::Sender<Result<TemplateState, StoreError>>,
    },
    Remove {
        subject_id: SubjectId,
        reply: oneshot::Sender<Result<bool, StoreError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Extract a descriptor from `image` and store it as the subject's template.
    pub async fn enroll(&self, subject_id: SubjectId, image: Vec<u8>) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Enroll {
            subject_id,
            image,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Extract a descriptor from `image` and compare it with the stored template.
    pub async fn verify(
        &self,
        subject_id: SubjectId,
        image: Vec<u8>,
        threshold: Option<f64>,
    ) -> Result<VerificationResult, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Verify {
            subject_id,
            image,
            threshold,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Run an integrity scan over every stored template.
    pub async fn scan(&self, mode: ScanMode) -> Result<IntegrityReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Scan { mode, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn template_state(&self, subject_id: SubjectId) -> Result<TemplateState, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::State { subject_id, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn remove(&self, subject_id: SubjectId) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Remove { subject_id, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    async fn send(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the workflow and a scanner over the same store, and
/// handles one request at a time. Enrollments, repairs and removals are
/// therefore serialized per subject without any extra locking.
pub fn spawn_engine<S, E>(workflow: VerificationWorkflow<S, E>) -> Result<EngineHandle, EngineError>
where
    S: TemplateStore + Clone + Send + 'static,
    E: FeatureExtractor + Send + 'static,
{
    let scanner = IntegrityScanner::new(workflow.store().clone());
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        subject_id,
                        image,
                        reply,
                    } => {
                        let result = workflow.enroll_image(&subject_id, &image);
                        if let Err(e) = &result {
                            tracing::warn!(subject = %subject_id, error = %e, "enroll failed");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::Verify {
                        subject_id,
                        image,
                        threshold,
                        reply,
                    } => {
                        let result = workflow.verify_image(&subject_id, &image, threshold);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Scan { mode, reply } => {
                        let _ = reply.send(scanner.scan(mode));
                    }
                    EngineRequest::State { subject_id, reply } => {
                        let _ = reply.send(workflow.template_state(&subject_id));
                    }
                    EngineRequest::Remove { subject_id, reply } => {
                        let _ = reply.send(workflow.remove(&subject_id));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
