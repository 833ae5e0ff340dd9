//! Per-session rolling aggregate of the latest label per student.
//!
//! Each live session owns one [`AggregateState`] behind its own mutex, so
//! submissions for different sessions never contend. The outer map is only
//! write-locked when a session's aggregate is created.

use crate::core::error::SessionError;
use crate::core::label::EmotionLabel;
use crate::core::session::{SessionId, StudentId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Presentation data for a student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    pub name: String,
    pub roll_no: Option<String>,
}

impl StudentProfile {
    pub fn placeholder(student_id: StudentId) -> Self {
        Self {
            name: format!("Student {student_id}"),
            roll_no: None,
        }
    }
}

/// Optional presentation fields carried by a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub roll_no: Option<String>,
}

/// Current state for one reporting student.
#[derive(Debug, Clone)]
pub struct StudentEntry {
    pub profile: StudentProfile,
    /// Most recent label (latest wins)
    pub label: EmotionLabel,
    pub last_seen_at: DateTime<Utc>,
    /// Number of accepted samples since the session started
    pub sample_count: u64,
    /// Per-label tallies, used only for the end-of-session summary
    pub label_counts: BTreeMap<EmotionLabel, u64>,
}

impl StudentEntry {
    /// Most frequent label over the session; ties go to the earlier label.
    pub fn dominant_label(&self) -> Option<EmotionLabel> {
        let mut best: Option<(EmotionLabel, u64)> = None;
        for (&label, &count) in &self.label_counts {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((label, count));
            }
        }
        best.map(|(label, _)| label)
    }
}

/// Latest-wins label map for one session.
#[derive(Debug, Clone, Default)]
pub struct AggregateState {
    students: BTreeMap<StudentId, StudentEntry>,
    frozen: bool,
}

impl AggregateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a label for a student, replacing any earlier one.
    ///
    /// Fails once the aggregate has been frozen by the end of its session.
    pub fn upsert(
        &mut self,
        session_id: SessionId,
        student_id: StudentId,
        label: EmotionLabel,
        profile: ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if self.frozen {
            return Err(SessionError::SessionNotLive(session_id));
        }

        let entry = self
            .students
            .entry(student_id)
            .or_insert_with(|| StudentEntry {
                profile: StudentProfile::placeholder(student_id),
                label,
                last_seen_at: at,
                sample_count: 0,
                label_counts: BTreeMap::new(),
            });

        if let Some(name) = profile.name.filter(|n| !n.trim().is_empty()) {
            entry.profile.name = name;
        }
        if let Some(roll_no) = profile.roll_no.filter(|r| !r.trim().is_empty()) {
            entry.profile.roll_no = Some(roll_no);
        }

        entry.label = label;
        entry.last_seen_at = at;
        entry.sample_count += 1;
        *entry.label_counts.entry(label).or_insert(0) += 1;
        Ok(())
    }

    /// Stop accepting samples. Irreversible.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of distinct students that have reported.
    pub fn active_count(&self) -> usize {
        self.students.len()
    }

    /// Students ordered by id.
    pub fn students(&self) -> impl Iterator<Item = (StudentId, &StudentEntry)> {
        self.students.iter().map(|(&id, entry)| (id, entry))
    }

    pub fn student(&self, student_id: StudentId) -> Option<&StudentEntry> {
        self.students.get(&student_id)
    }
}

/// Handle to one session's aggregate.
pub type SharedAggregate = Arc<Mutex<AggregateState>>;

/// Owns every session's aggregate.
#[derive(Debug, Default)]
pub struct TelemetryIngestor {
    sessions: RwLock<HashMap<SessionId, SharedAggregate>>,
}

impl TelemetryIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the aggregate for a session that just went live.
    pub async fn open(&self, session_id: SessionId) -> SharedAggregate {
        self.sessions
            .write()
            .await
            .entry(session_id)
            .or_default()
            .clone()
    }

    pub async fn aggregate(&self, session_id: SessionId) -> Option<SharedAggregate> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Upsert a classified label. Only the target session's mutex is held.
    pub async fn record(
        &self,
        session_id: SessionId,
        student_id: StudentId,
        label: EmotionLabel,
        profile: ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let aggregate = self
            .aggregate(session_id)
            .await
            .ok_or(SessionError::SessionNotLive(session_id))?;
        let mut state = aggregate.lock().await;
        state.upsert(session_id, student_id, label, profile, at)
    }

    /// Upsert into a session already known to be live.
    ///
    /// Creates the aggregate if the start has not opened it yet, so a sample
    /// arriving right after the transition is never turned away.
    pub async fn record_live(
        &self,
        session_id: SessionId,
        student_id: StudentId,
        label: EmotionLabel,
        profile: ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let aggregate = self.open(session_id).await;
        let mut state = aggregate.lock().await;
        state.upsert(session_id, student_id, label, profile, at)
    }

    /// Freeze a session's aggregate so no further samples land.
    pub async fn freeze(&self, session_id: SessionId) {
        if let Some(aggregate) = self.aggregate(session_id).await {
            aggregate.lock().await.freeze();
        }
    }
}
