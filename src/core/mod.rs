//! Core functionality for classroom live sessions.
//!
//! This module contains:
//! - The session registry and its lifecycle state machine
//! - Emotion labels and the classifier seam
//! - The per-session telemetry aggregate
//! - Snapshot and attendance builders
//! - The hub that ties them together

pub mod aggregate;
pub mod error;
pub mod hub;
pub mod label;
pub mod session;
pub mod snapshot;

// Re-export commonly used types
pub use aggregate::{AggregateState, ProfileUpdate, StudentProfile, TelemetryIngestor};
pub use error::{ClassificationError, SessionError};
pub use hub::{CurrentLive, EndedSession, HubConfig, SampleSubmission, SessionHub};
pub use label::{Classifier, EmotionLabel, Frame, HintClassifier};
pub use session::{
    GroupId, ScheduleWindow, Session, SessionId, SessionRegistry, SessionState, StartedSession,
    StudentId,
};
pub use snapshot::{
    build_attendance, build_snapshot, engagement_score, AggregateSnapshot, AttendanceSummary,
    StudentAttendance, StudentSnapshot,
};
