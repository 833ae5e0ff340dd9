//! The session hub: one authoritative process's view of every session.
//!
//! Wires the [`SessionRegistry`], the [`TelemetryIngestor`] and the external
//! [`Classifier`] together and exposes the operations the HTTP layer serves.

use crate::core::aggregate::{ProfileUpdate, TelemetryIngestor};
use crate::core::error::SessionError;
use crate::core::label::{Classifier, EmotionLabel, Frame};
use crate::core::session::{
    GroupId, ScheduleWindow, Session, SessionId, SessionRegistry, SessionState, StartedSession,
    StudentId,
};
use crate::core::snapshot::{
    build_attendance, build_snapshot, empty_snapshot, AggregateSnapshot, AttendanceSummary,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for the hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Cadence clients capture at; converts sample counts into minutes
    pub capture_interval: Duration,
    /// Age after which a student's last sample is marked stale
    pub stale_after: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(30),
        }
    }
}

/// One telemetry submission as received from a client.
#[derive(Debug, Clone)]
pub struct SampleSubmission {
    pub session_id: SessionId,
    pub student_id: StudentId,
    /// Wire payload: base64 or a base64 data URL
    pub frame: String,
    pub profile: ProfileUpdate,
}

/// Answer to the crash-recovery query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentLive {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

impl CurrentLive {
    pub fn inactive() -> Self {
        Self {
            active: false,
            session_id: None,
            topic: None,
            start_time: None,
        }
    }

    /// Elapsed live time as seen at `now`, reconstructed from the start time.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match (self.active, self.start_time) {
            (true, Some(start)) => Some((now - start).max(chrono::Duration::zero())),
            _ => None,
        }
    }
}

impl From<&Session> for CurrentLive {
    fn from(session: &Session) -> Self {
        Self {
            active: session.is_live(),
            session_id: Some(session.session_id),
            topic: Some(session.topic.clone()),
            start_time: session.start_time,
        }
    }
}

/// Outcome of ending a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndedSession {
    pub session_id: SessionId,
    pub end_time: DateTime<Utc>,
    pub summary: Option<AttendanceSummary>,
}

/// Live-session coordinator.
pub struct SessionHub {
    registry: SessionRegistry,
    ingestor: TelemetryIngestor,
    classifier: Arc<dyn Classifier>,
    config: HubConfig,
}

impl SessionHub {
    pub fn new(classifier: Arc<dyn Classifier>, config: HubConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            ingestor: TelemetryIngestor::new(),
            classifier,
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub async fn schedule_session(
        &self,
        group_id: GroupId,
        topic: impl Into<String>,
        window: ScheduleWindow,
    ) -> Session {
        let session = self.registry.schedule(group_id, topic, window).await;
        tracing::info!(
            session_id = session.session_id,
            group_id,
            start = %window.start,
            "session scheduled"
        );
        session
    }

    pub async fn start_instant(
        &self,
        group_id: GroupId,
        topic: impl Into<String>,
    ) -> Result<StartedSession, SessionError> {
        let started = self
            .registry
            .start_instant(group_id, topic, Utc::now())
            .await
            .inspect_err(|e| tracing::warn!(group_id, "instant start rejected: {e}"))?;
        self.ingestor.open(started.session_id).await;
        tracing::info!(session_id = started.session_id, group_id, "session started");
        Ok(started)
    }

    pub async fn start_scheduled(
        &self,
        session_id: SessionId,
    ) -> Result<StartedSession, SessionError> {
        let started = self
            .registry
            .start_scheduled(session_id, Utc::now())
            .await
            .inspect_err(|e| tracing::warn!(session_id, "scheduled start rejected: {e}"))?;
        self.ingestor.open(session_id).await;
        tracing::info!(session_id, "scheduled session started");
        Ok(started)
    }

    /// End a session and freeze its aggregate. Repeat calls succeed and
    /// return the same end time and summary.
    pub async fn end_session(&self, session_id: SessionId) -> Result<EndedSession, SessionError> {
        if self.registry.get(session_id).await.is_none() {
            return Err(SessionError::SessionNotFound(session_id));
        }

        // Hold the aggregate across the transition so no upsert can slip in
        // between the state change and the freeze. Get-or-create, because the
        // start may not have opened it yet.
        let aggregate = self.ingestor.open(session_id).await;
        let mut state = aggregate.lock().await;

        let outcome = self.registry.end(session_id, Utc::now()).await?;
        state.freeze();

        let summary = build_attendance(&outcome.session, &state, self.config.capture_interval);
        drop(state);

        if outcome.transitioned {
            tracing::info!(
                session_id,
                group_id = outcome.session.group_id,
                students = summary.as_ref().map_or(0, |s| s.students.len()),
                "session ended"
            );
        } else {
            tracing::debug!(session_id, "end requested for already ended session");
        }

        let end_time = outcome
            .session
            .end_time
            .ok_or(SessionError::SessionNotLive(session_id))?;
        Ok(EndedSession {
            session_id,
            end_time,
            summary,
        })
    }

    /// Accept a frame from a student, classify it and fold the label into
    /// the session aggregate.
    pub async fn submit(&self, sample: SampleSubmission) -> Result<EmotionLabel, SessionError> {
        let SampleSubmission {
            session_id,
            student_id,
            frame,
            profile,
        } = sample;

        if !self.registry.is_live(session_id).await {
            tracing::debug!(session_id, student_id, "submission rejected: session not live");
            return Err(SessionError::SessionNotLive(session_id));
        }

        let frame = Frame::decode_wire(&frame)?;
        let label = self.classify(frame).await;

        // The aggregate is frozen under its own lock when the session ends,
        // so a sample that raced the end is rejected here. One that raced
        // the start creates the aggregate the start is about to open.
        self.ingestor
            .record_live(session_id, student_id, label, profile, Utc::now())
            .await?;

        tracing::debug!(session_id, student_id, %label, "sample recorded");
        Ok(label)
    }

    async fn classify(&self, frame: Option<Frame>) -> EmotionLabel {
        let Some(frame) = frame else {
            return EmotionLabel::Unknown;
        };

        let classifier = self.classifier.clone();
        match tokio::task::spawn_blocking(move || classifier.classify(&frame)).await {
            Ok(Ok(label)) => label,
            Ok(Err(e)) => {
                tracing::debug!("classification failed, recording Unknown: {e}");
                EmotionLabel::Unknown
            }
            Err(e) => {
                tracing::warn!("classifier task failed, recording Unknown: {e}");
                EmotionLabel::Unknown
            }
        }
    }

    /// Current snapshot of a session; scheduled sessions report an empty one.
    pub async fn snapshot(&self, session_id: SessionId) -> Result<AggregateSnapshot, SessionError> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or(SessionError::SessionNotFound(session_id))?;

        let now = Utc::now();
        match self.ingestor.aggregate(session_id).await {
            Some(aggregate) => {
                let state = aggregate.lock().await;
                let stale_after = chrono::Duration::from_std(self.config.stale_after)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30));
                Ok(build_snapshot(session_id, session.state, &state, stale_after, now))
            }
            None => Ok(empty_snapshot(session_id, session.state, now)),
        }
    }

    /// Crash-recovery query for a group.
    pub async fn current_live(&self, group_id: GroupId) -> CurrentLive {
        self.registry
            .current_live(group_id)
            .await
            .map(|session| CurrentLive::from(&session))
            .unwrap_or_else(CurrentLive::inactive)
    }

    /// Attendance report for an ended session.
    pub async fn summary(&self, session_id: SessionId) -> Result<AttendanceSummary, SessionError> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or(SessionError::SessionNotFound(session_id))?;
        if session.state != SessionState::Ended {
            return Err(SessionError::SessionStillLive(session_id));
        }

        let aggregate = self
            .ingestor
            .aggregate(session_id)
            .await
            .ok_or(SessionError::SessionNotFound(session_id))?;
        let state = aggregate.lock().await;
        build_attendance(&session, &state, self.config.capture_interval)
            .ok_or(SessionError::SessionStillLive(session_id))
    }

    pub async fn scheduled_sessions(&self, group_id: GroupId) -> Vec<Session> {
        self.registry.scheduled_for_group(group_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ClassificationError;
    use crate::core::label::HintClassifier;

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(&self, _frame: &Frame) -> Result<EmotionLabel, ClassificationError> {
            Err(ClassificationError::Failed("model offline".to_string()))
        }
    }

    fn hub() -> SessionHub {
        SessionHub::new(Arc::new(HintClassifier), HubConfig::default())
    }

    fn sample(session_id: SessionId, student_id: StudentId, raw: &str) -> SampleSubmission {
        SampleSubmission {
            session_id,
            student_id,
            frame: Frame::from_bytes(raw.as_bytes().to_vec()).to_data_url(),
            profile: ProfileUpdate::default(),
        }
    }

    #[tokio::test]
    async fn test_submit_classifies_and_aggregates() {
        let hub = hub();
        let started = hub.start_instant(7, "X").await.unwrap();

        let label = hub.submit(sample(started.session_id, 42, "happy")).await.unwrap();
        assert_eq!(label, EmotionLabel::Focused);

        let snapshot = hub.snapshot(started.session_id).await.unwrap();
        assert_eq!(snapshot.total_active, 1);
        assert_eq!(snapshot.state, SessionState::Live);
    }

    #[tokio::test]
    async fn test_classifier_failure_is_unknown() {
        let hub = SessionHub::new(Arc::new(FailingClassifier), HubConfig::default());
        let started = hub.start_instant(1, "X").await.unwrap();

        let label = hub.submit(sample(started.session_id, 1, "happy")).await.unwrap();
        assert_eq!(label, EmotionLabel::Unknown);

        let snapshot = hub.snapshot(started.session_id).await.unwrap();
        assert_eq!(snapshot.total_active, 1);
        assert_eq!(snapshot.engagement_score, 0);
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_unknown() {
        let hub = hub();
        let started = hub.start_instant(1, "X").await.unwrap();
        let mut bad = sample(started.session_id, 1, "happy");
        bad.frame = "data:image/jpeg;base64,@@@".to_string();

        assert_eq!(hub.submit(bad).await.unwrap(), EmotionLabel::Unknown);
    }

    #[tokio::test]
    async fn test_missing_frame_rejected() {
        let hub = hub();
        let started = hub.start_instant(1, "X").await.unwrap();
        let mut empty = sample(started.session_id, 1, "happy");
        empty.frame = String::new();

        assert_eq!(hub.submit(empty).await.unwrap_err(), SessionError::MissingFrame);
    }

    #[tokio::test]
    async fn test_submit_to_scheduled_session_rejected() {
        let hub = hub();
        let now = Utc::now();
        let window = ScheduleWindow::new(now, now + chrono::Duration::hours(1)).unwrap();
        let session = hub.schedule_session(3, "Later", window).await;

        let err = hub.submit(sample(session.session_id, 1, "happy")).await.unwrap_err();
        assert_eq!(err, SessionError::SessionNotLive(session.session_id));

        let snapshot = hub.snapshot(session.session_id).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Scheduled);
        assert_eq!(snapshot.total_active, 0);
    }

    #[tokio::test]
    async fn test_end_freezes_and_summarizes() {
        let hub = hub();
        let started = hub.start_instant(7, "X").await.unwrap();
        hub.submit(sample(started.session_id, 42, "happy")).await.unwrap();

        let ended = hub.end_session(started.session_id).await.unwrap();
        let summary = ended.summary.unwrap();
        assert_eq!(summary.students.len(), 1);
        assert_eq!(summary.students[0].samples, 1);

        for _ in 0..3 {
            let err = hub.submit(sample(started.session_id, 42, "sad")).await.unwrap_err();
            assert_eq!(err, SessionError::SessionNotLive(started.session_id));
        }

        // Frozen aggregate still readable
        let snapshot = hub.snapshot(started.session_id).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Ended);
        assert_eq!(snapshot.mood_distribution[&EmotionLabel::Focused], 1);

        let again = hub.end_session(started.session_id).await.unwrap();
        assert_eq!(again.end_time, ended.end_time);
        assert_eq!(hub.summary(started.session_id).await.unwrap().students.len(), 1);
    }

    #[tokio::test]
    async fn test_summary_requires_end() {
        let hub = hub();
        let started = hub.start_instant(7, "X").await.unwrap();
        assert_eq!(
            hub.summary(started.session_id).await.unwrap_err(),
            SessionError::SessionStillLive(started.session_id)
        );
        assert_eq!(
            hub.summary(999).await.unwrap_err(),
            SessionError::SessionNotFound(999)
        );
    }

    #[tokio::test]
    async fn test_current_live_and_elapsed() {
        let hub = hub();
        assert_eq!(hub.current_live(7).await, CurrentLive::inactive());

        let started = hub.start_instant(7, "Graphs").await.unwrap();
        let current = hub.current_live(7).await;
        assert!(current.active);
        assert_eq!(current.session_id, Some(started.session_id));
        assert_eq!(current.topic.as_deref(), Some("Graphs"));

        let later = started.start_time + chrono::Duration::seconds(754);
        assert_eq!(current.elapsed_at(later), Some(chrono::Duration::seconds(754)));

        hub.end_session(started.session_id).await.unwrap();
        let after = hub.current_live(7).await;
        assert!(!after.active);
        assert_eq!(after.elapsed_at(later), None);
    }

    #[tokio::test]
    async fn test_snapshot_unknown_session() {
        let hub = hub();
        assert_eq!(
            hub.snapshot(12).await.unwrap_err(),
            SessionError::SessionNotFound(12)
        );
    }
}
