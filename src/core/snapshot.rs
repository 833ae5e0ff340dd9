//! Read-side views derived from an [`AggregateState`].
//!
//! Both builders are pure: they take the state by reference and return owned
//! values, so nothing a caller holds can alias the live aggregate.

use crate::core::aggregate::AggregateState;
use crate::core::label::EmotionLabel;
use crate::core::session::{Session, SessionId, SessionState, StudentId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One student's row in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub student_id: StudentId,
    pub name: String,
    pub roll_no: Option<String>,
    pub emotion_label: EmotionLabel,
    pub last_seen_at: DateTime<Utc>,
    /// No sample within the staleness window; still counted as active
    pub stale: bool,
}

/// Immutable summary served to polling dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub session_id: SessionId,
    pub state: SessionState,
    pub generated_at: DateTime<Utc>,
    pub total_active: usize,
    pub mood_distribution: BTreeMap<EmotionLabel, usize>,
    /// 0-100
    pub engagement_score: u8,
    /// Ordered by student id
    pub students: Vec<StudentSnapshot>,
}

/// Engagement over a mood distribution.
///
/// `floor(100 * positive / (positive + negative))`; `Unknown` labels are
/// left out of both sides and an empty distribution scores 0.
pub fn engagement_score(distribution: &BTreeMap<EmotionLabel, usize>) -> u8 {
    let (positive, negative) =
        distribution
            .iter()
            .fold((0usize, 0usize), |(pos, neg), (label, &count)| {
                if label.is_positive() {
                    (pos + count, neg)
                } else if label.is_negative() {
                    (pos, neg + count)
                } else {
                    (pos, neg)
                }
            });

    let rated = positive + negative;
    if rated == 0 {
        return 0;
    }
    // positive <= rated, so the quotient is at most 100
    ((positive * 100) / rated) as u8
}

/// Build the snapshot for a session from its aggregate.
pub fn build_snapshot(
    session_id: SessionId,
    state: SessionState,
    aggregate: &AggregateState,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> AggregateSnapshot {
    let mut mood_distribution: BTreeMap<EmotionLabel, usize> =
        EmotionLabel::ALL.iter().map(|&label| (label, 0)).collect();

    let students: Vec<StudentSnapshot> = aggregate
        .students()
        .map(|(student_id, entry)| {
            *mood_distribution.entry(entry.label).or_insert(0) += 1;
            StudentSnapshot {
                student_id,
                name: entry.profile.name.clone(),
                roll_no: entry.profile.roll_no.clone(),
                emotion_label: entry.label,
                last_seen_at: entry.last_seen_at,
                stale: now - entry.last_seen_at > stale_after,
            }
        })
        .collect();

    AggregateSnapshot {
        session_id,
        state,
        generated_at: now,
        total_active: students.len(),
        engagement_score: engagement_score(&mood_distribution),
        mood_distribution,
        students,
    }
}

/// Snapshot of a session that has no aggregate yet (still scheduled).
pub fn empty_snapshot(
    session_id: SessionId,
    state: SessionState,
    now: DateTime<Utc>,
) -> AggregateSnapshot {
    build_snapshot(session_id, state, &AggregateState::new(), Duration::zero(), now)
}

/// Attendance for one student over a whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAttendance {
    pub student_id: StudentId,
    pub name: String,
    pub roll_no: Option<String>,
    pub samples: u64,
    pub minutes_detected: f64,
    pub attendance_percentage: f64,
    pub dominant_mood: Option<EmotionLabel>,
}

/// End-of-session report computed from the frozen aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub session_id: SessionId,
    pub topic: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u64,
    pub avg_attendance_percentage: f64,
    pub dominant_class_mood: Option<EmotionLabel>,
    pub students: Vec<StudentAttendance>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Build the attendance report for an ended session.
///
/// Each accepted sample stands for one capture interval of presence.
/// Returns `None` when the session lacks a start or end time.
pub fn build_attendance(
    session: &Session,
    aggregate: &AggregateState,
    capture_interval: std::time::Duration,
) -> Option<AttendanceSummary> {
    let start_time = session.start_time?;
    let end_time = session.end_time?;

    let elapsed_secs = (end_time - start_time).num_seconds().max(0) as u64;
    let duration_minutes = (elapsed_secs / 60).max(1);
    let interval_secs = capture_interval.as_secs_f64();

    let students: Vec<StudentAttendance> = aggregate
        .students()
        .map(|(student_id, entry)| {
            let minutes_detected = round2(entry.sample_count as f64 * interval_secs / 60.0);
            let attendance_percentage =
                (minutes_detected / duration_minutes as f64 * 100.0).min(100.0);
            StudentAttendance {
                student_id,
                name: entry.profile.name.clone(),
                roll_no: entry.profile.roll_no.clone(),
                samples: entry.sample_count,
                minutes_detected,
                attendance_percentage,
                dominant_mood: entry.dominant_label(),
            }
        })
        .collect();

    let avg_attendance_percentage = if students.is_empty() {
        0.0
    } else {
        students.iter().map(|s| s.attendance_percentage).sum::<f64>() / students.len() as f64
    };

    let mut class_moods: BTreeMap<EmotionLabel, usize> = BTreeMap::new();
    for mood in students.iter().filter_map(|s| s.dominant_mood) {
        *class_moods.entry(mood).or_insert(0) += 1;
    }
    let dominant_class_mood = class_moods
        .iter()
        .fold(None, |best: Option<(EmotionLabel, usize)>, (&label, &count)| {
            match best {
                Some((_, top)) if top >= count => best,
                _ => Some((label, count)),
            }
        })
        .map(|(label, _)| label);

    Some(AttendanceSummary {
        session_id: session.session_id,
        topic: session.topic.clone(),
        start_time,
        end_time,
        duration_minutes,
        avg_attendance_percentage: round2(avg_attendance_percentage),
        dominant_class_mood,
        students,
    })
}
