//! Where the capture loop sends its samples.

use crate::core::{EmotionLabel, SampleSubmission, SessionError, SessionHub};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Submission failures as seen by the capture loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The session has ended. Terminal for the loop.
    #[error("session is not live")]
    SessionNotLive,
    /// Anything else; the next tick tries again.
    #[error("transient submission failure: {0}")]
    Transient(String),
}

/// Receiver of telemetry samples.
pub trait SampleSink: Send + Sync + 'static {
    fn submit(
        &self,
        sample: SampleSubmission,
    ) -> impl Future<Output = Result<EmotionLabel, SubmitError>> + Send;
}

/// In-process submission straight into a hub.
impl SampleSink for Arc<SessionHub> {
    async fn submit(&self, sample: SampleSubmission) -> Result<EmotionLabel, SubmitError> {
        SessionHub::submit(self, sample).await.map_err(|e| match e {
            SessionError::SessionNotLive(_) => SubmitError::SessionNotLive,
            other => SubmitError::Transient(other.to_string()),
        })
    }
}
