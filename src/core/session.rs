//! Session records and the lifecycle state machine.
//!
//! Sessions move `Scheduled -> Live -> Ended` and never go back. The registry
//! keeps a `group_id -> live session` index next to the records so the
//! "one live session per group" check and the transition happen under the
//! same write lock.

use crate::core::error::SessionError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub type SessionId = u64;
pub type GroupId = u64;
pub type StudentId = u64;

/// Format accepted for naive schedule timestamps (interpreted as UTC).
const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Scheduled,
    Live,
    Ended,
}

/// Planned time window for a scheduled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScheduleWindow {
    /// Build a window, rejecting ones that end at or before their start.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SessionError> {
        if end <= start {
            return Err(SessionError::InvalidWindow(format!(
                "end {end} is not after start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a window from RFC 3339 or `YYYY-MM-DD HH:MM:SS` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, SessionError> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, SessionError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, SCHEDULE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            SessionError::InvalidWindow(format!(
                "'{value}' is neither RFC 3339 nor YYYY-MM-DD HH:MM:SS"
            ))
        })
}

/// One monitored class meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub group_id: GroupId,
    pub topic: String,
    pub state: SessionState,
    /// Planned window (absent for instant sessions)
    pub window: Option<ScheduleWindow>,
    /// Set on the transition to `Live`
    pub start_time: Option<DateTime<Utc>>,
    /// Set on the transition to `Ended`
    pub end_time: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_live(&self) -> bool {
        self.state == SessionState::Live
    }
}

/// Result of a successful start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub start_time: DateTime<Utc>,
}

/// Result of ending a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOutcome {
    pub session: Session,
    /// False when the session had already ended before this call
    pub transitioned: bool,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: SessionId,
    sessions: HashMap<SessionId, Session>,
    live_by_group: HashMap<GroupId, SessionId>,
}

impl RegistryInner {
    fn allocate_id(&mut self) -> SessionId {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_group_idle(&self, group_id: GroupId) -> Result<(), SessionError> {
        match self.live_by_group.get(&group_id) {
            Some(&session_id) => Err(SessionError::GroupAlreadyLive {
                group_id,
                session_id,
            }),
            None => Ok(()),
        }
    }
}

/// Owns every session record and enforces the lifecycle.
///
/// All timestamps are supplied by the caller so transitions are deterministic
/// under test.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `Scheduled` session.
    pub async fn schedule(
        &self,
        group_id: GroupId,
        topic: impl Into<String>,
        window: ScheduleWindow,
    ) -> Session {
        let mut inner = self.inner.write().await;
        let session = Session {
            session_id: inner.allocate_id(),
            group_id,
            topic: topic.into(),
            state: SessionState::Scheduled,
            window: Some(window),
            start_time: None,
            end_time: None,
        };
        inner.sessions.insert(session.session_id, session.clone());
        session
    }

    /// Create a session directly in `Live`.
    pub async fn start_instant(
        &self,
        group_id: GroupId,
        topic: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<StartedSession, SessionError> {
        let mut inner = self.inner.write().await;
        inner.ensure_group_idle(group_id)?;

        let session_id = inner.allocate_id();
        inner.sessions.insert(
            session_id,
            Session {
                session_id,
                group_id,
                topic: topic.into(),
                state: SessionState::Live,
                window: None,
                start_time: Some(now),
                end_time: None,
            },
        );
        inner.live_by_group.insert(group_id, session_id);

        Ok(StartedSession {
            session_id,
            start_time: now,
        })
    }

    /// Move a `Scheduled` session to `Live`.
    pub async fn start_scheduled(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<StartedSession, SessionError> {
        let mut inner = self.inner.write().await;

        let (group_id, state) = inner
            .sessions
            .get(&session_id)
            .map(|s| (s.group_id, s.state))
            .ok_or(SessionError::SessionNotFound(session_id))?;

        if state != SessionState::Scheduled {
            return Err(SessionError::InvalidTransition {
                session_id,
                from: state,
            });
        }
        inner.ensure_group_idle(group_id)?;

        if let Some(session) = inner.sessions.get_mut(&session_id) {
            session.state = SessionState::Live;
            session.start_time = Some(now);
        }
        inner.live_by_group.insert(group_id, session_id);

        Ok(StartedSession {
            session_id,
            start_time: now,
        })
    }

    /// Move a `Live` session to `Ended`. Ending an ended session succeeds
    /// without changing it.
    pub async fn end(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<EndOutcome, SessionError> {
        let mut inner = self.inner.write().await;

        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or(SessionError::SessionNotFound(session_id))?;

        match session.state {
            SessionState::Ended => Ok(EndOutcome {
                session: session.clone(),
                transitioned: false,
            }),
            SessionState::Scheduled => Err(SessionError::SessionNotLive(session_id)),
            SessionState::Live => {
                session.state = SessionState::Ended;
                session.end_time = Some(now);
                let session = session.clone();
                inner.live_by_group.remove(&session.group_id);
                Ok(EndOutcome {
                    session,
                    transitioned: true,
                })
            }
        }
    }

    /// The live session for a group, if any.
    pub async fn current_live(&self, group_id: GroupId) -> Option<Session> {
        let inner = self.inner.read().await;
        inner
            .live_by_group
            .get(&group_id)
            .and_then(|id| inner.sessions.get(id))
            .cloned()
    }

    pub async fn is_live(&self, session_id: SessionId) -> bool {
        self.inner
            .read()
            .await
            .sessions
            .get(&session_id)
            .is_some_and(Session::is_live)
    }

    pub async fn get(&self, session_id: SessionId) -> Option<Session> {
        self.inner.read().await.sessions.get(&session_id).cloned()
    }

    /// Sessions of a group still waiting to start, by planned start.
    pub async fn scheduled_for_group(&self, group_id: GroupId) -> Vec<Session> {
        let inner = self.inner.read().await;
        let mut scheduled: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.group_id == group_id && s.state == SessionState::Scheduled)
            .cloned()
            .collect();
        scheduled.sort_by_key(|s| (s.window.map(|w| w.start), s.session_id));
        scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn window(offset_hours: i64) -> ScheduleWindow {
        let start = Utc::now() + Duration::hours(offset_hours);
        ScheduleWindow::new(start, start + Duration::hours(1)).unwrap()
    }

    #[test]
    fn test_window_validation() {
        let now = Utc::now();
        assert!(ScheduleWindow::new(now, now).is_err());
        assert!(ScheduleWindow::new(now, now - Duration::minutes(5)).is_err());
        assert!(ScheduleWindow::new(now, now + Duration::minutes(5)).is_ok());
    }

    #[test]
    fn test_window_parsing() {
        let w = ScheduleWindow::parse("2024-01-22 10:00:00", "2024-01-22 11:00:00").unwrap();
        assert_eq!((w.end - w.start).num_minutes(), 60);

        let w = ScheduleWindow::parse("2024-01-22T10:00:00Z", "2024-01-22T10:30:00+00:00").unwrap();
        assert_eq!((w.end - w.start).num_minutes(), 30);

        assert!(matches!(
            ScheduleWindow::parse("tomorrow", "2024-01-22 11:00:00"),
            Err(SessionError::InvalidWindow(_))
        ));
        assert!(matches!(
            ScheduleWindow::parse("2024-01-22 11:00:00", "2024-01-22 10:00:00"),
            Err(SessionError::InvalidWindow(_))
        ));
    }

    #[tokio::test]
    async fn test_instant_start_and_end() {
        let registry = SessionRegistry::new();
        let now = Utc::now();

        let started = registry.start_instant(7, "Graphs", now).await.unwrap();
        assert_eq!(started.start_time, now);
        assert!(registry.is_live(started.session_id).await);

        let live = registry.current_live(7).await.unwrap();
        assert_eq!(live.session_id, started.session_id);
        assert_eq!(live.start_time, Some(now));

        let later = now + Duration::minutes(40);
        let outcome = registry.end(started.session_id, later).await.unwrap();
        assert!(outcome.transitioned);
        assert_eq!(outcome.session.end_time, Some(later));
        assert!(!registry.is_live(started.session_id).await);
        assert!(registry.current_live(7).await.is_none());
    }

    #[tokio::test]
    async fn test_end_is_idempotent() {
        let registry = SessionRegistry::new();
        let started = registry.start_instant(1, "X", Utc::now()).await.unwrap();
        let first = registry.end(started.session_id, Utc::now()).await.unwrap();
        let second = registry.end(started.session_id, Utc::now()).await.unwrap();

        assert!(first.transitioned);
        assert!(!second.transitioned);
        assert_eq!(first.session.end_time, second.session.end_time);
    }

    #[tokio::test]
    async fn test_second_live_session_for_group_rejected() {
        let registry = SessionRegistry::new();
        let first = registry.start_instant(7, "A", Utc::now()).await.unwrap();

        let err = registry.start_instant(7, "B", Utc::now()).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::GroupAlreadyLive {
                group_id: 7,
                session_id: first.session_id
            }
        );

        // Other groups are unaffected
        assert!(registry.start_instant(8, "C", Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_group_can_go_live_again_after_end() {
        let registry = SessionRegistry::new();
        let first = registry.start_instant(3, "A", Utc::now()).await.unwrap();
        registry.end(first.session_id, Utc::now()).await.unwrap();

        let second = registry.start_instant(3, "B", Utc::now()).await.unwrap();
        assert_ne!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn test_scheduled_lifecycle() {
        let registry = SessionRegistry::new();
        let session = registry.schedule(5, "Recursion", window(1)).await;
        assert_eq!(session.state, SessionState::Scheduled);
        assert!(!registry.is_live(session.session_id).await);

        // Ending a session that never started is not allowed
        assert_eq!(
            registry.end(session.session_id, Utc::now()).await.unwrap_err(),
            SessionError::SessionNotLive(session.session_id)
        );

        let started = registry
            .start_scheduled(session.session_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(started.session_id, session.session_id);
        assert!(registry.is_live(session.session_id).await);

        // No re-entry into Live
        let err = registry
            .start_scheduled(session.session_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                from: SessionState::Live,
                ..
            }
        ));

        registry.end(session.session_id, Utc::now()).await.unwrap();
        let err = registry
            .start_scheduled(session.session_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                from: SessionState::Ended,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_start_scheduled_respects_live_group() {
        let registry = SessionRegistry::new();
        let scheduled = registry.schedule(2, "Later", window(2)).await;
        registry.start_instant(2, "Now", Utc::now()).await.unwrap();

        let err = registry
            .start_scheduled(scheduled.session_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::GroupAlreadyLive { group_id: 2, .. }));
        assert_eq!(
            registry.get(scheduled.session_id).await.unwrap().state,
            SessionState::Scheduled
        );
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.start_scheduled(99, Utc::now()).await.unwrap_err(),
            SessionError::SessionNotFound(99)
        );
        assert_eq!(
            registry.end(99, Utc::now()).await.unwrap_err(),
            SessionError::SessionNotFound(99)
        );
        assert!(!registry.is_live(99).await);
    }

    #[tokio::test]
    async fn test_scheduled_listing_order() {
        let registry = SessionRegistry::new();
        let later = registry.schedule(4, "Later", window(5)).await;
        let sooner = registry.schedule(4, "Sooner", window(1)).await;
        registry.schedule(9, "Other group", window(1)).await;

        let listed = registry.scheduled_for_group(4).await;
        let ids: Vec<_> = listed.iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec![sooner.session_id, later.session_id]);
    }

    #[tokio::test]
    async fn test_concurrent_instant_starts_single_winner() {
        let registry = Arc::new(SessionRegistry::new());

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .start_instant(7, format!("race {i}"), Utc::now())
                    .await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(SessionError::GroupAlreadyLive { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 15);
    }
}
