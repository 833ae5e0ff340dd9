//! Request and response bodies shared by the HTTP server and client.

use crate::core::{EmotionLabel, GroupId, ProfileUpdate, SampleSubmission, Session, SessionId, StudentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// POST /sessions/schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub group_id: GroupId,
    pub topic: String,
    /// RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC)
    pub scheduled_start: String,
    pub scheduled_end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub session_id: SessionId,
}

/// POST /sessions/start_instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartInstantRequest {
    pub group_id: GroupId,
    pub topic: String,
}

/// POST /sessions/:session_id/samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSampleRequest {
    pub student_id: StudentId,
    /// Base64 image, optionally as a data URL
    #[serde(default)]
    pub frame: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_no: Option<String>,
}

impl SubmitSampleRequest {
    pub fn into_submission(self, session_id: SessionId) -> SampleSubmission {
        SampleSubmission {
            session_id,
            student_id: self.student_id,
            frame: self.frame,
            profile: ProfileUpdate {
                name: self.student_name,
                roll_no: self.roll_no,
            },
        }
    }
}

impl From<SampleSubmission> for SubmitSampleRequest {
    fn from(sample: SampleSubmission) -> Self {
        Self {
            student_id: sample.student_id,
            frame: sample.frame,
            student_name: sample.profile.name,
            roll_no: sample.profile.roll_no,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSampleResponse {
    pub emotion_label: EmotionLabel,
}

/// One entry of GET /groups/:group_id/scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledSessionInfo {
    pub session_id: SessionId,
    pub topic: String,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
}

impl From<&Session> for ScheduledSessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id,
            topic: session.topic.clone(),
            scheduled_start: session.window.map(|w| w.start),
            scheduled_end: session.window.map(|w| w.end),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSessionsResponse {
    pub scheduled_sessions: Vec<ScheduledSessionInfo>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
