//! Error types for the session lifecycle and telemetry path.

use crate::core::session::{GroupId, SessionId, SessionState};
use thiserror::Error;

/// Errors raised by the registry, the ingestor and the hub.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The scheduling window could not be parsed or ends before it starts.
    #[error("invalid schedule window: {0}")]
    InvalidWindow(String),

    /// Another session for the same group is already live.
    #[error("group {group_id} already has live session {session_id}")]
    GroupAlreadyLive {
        group_id: GroupId,
        session_id: SessionId,
    },

    /// Submission rejected because the session is not accepting data.
    #[error("session {0} is not currently live")]
    SessionNotLive(SessionId),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// The requested transition is not allowed from the current state.
    #[error("session {session_id} cannot be started from state {from:?}")]
    InvalidTransition {
        session_id: SessionId,
        from: SessionState,
    },

    /// The attendance summary only exists once the session has ended.
    #[error("session {0} has not ended yet")]
    SessionStillLive(SessionId),

    #[error("no frame data provided")]
    MissingFrame,
}

impl SessionError {
    /// Stable machine-readable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidWindow(_) => "INVALID_WINDOW",
            SessionError::GroupAlreadyLive { .. } => "GROUP_ALREADY_LIVE",
            SessionError::SessionNotLive(_) => "SESSION_NOT_LIVE",
            SessionError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            SessionError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SessionError::SessionStillLive(_) => "SESSION_STILL_LIVE",
            SessionError::MissingFrame => "MISSING_FRAME",
        }
    }
}

/// Failure inside the classification collaborator.
///
/// Never surfaced to callers: the ingestor recovers it as
/// [`EmotionLabel::Unknown`](crate::core::EmotionLabel::Unknown).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("no face detected in frame")]
    NoFace,
    #[error("classification failed: {0}")]
    Failed(String),
}
