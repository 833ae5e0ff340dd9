//! Dashboard sync: crash recovery and snapshot polling.
//!
//! A dashboard keeps no timer of its own. After a reload it asks once for the
//! group's live session and rebuilds the elapsed time from `start_time`, then
//! polls snapshots on a fixed interval. Missed polls lose nothing because each
//! snapshot is the full cumulative state.

use crate::core::{
    AggregateSnapshot, CurrentLive, GroupId, SessionError, SessionHub, SessionId, SessionState,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("server unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the session server as the dashboard sees it.
pub trait DashboardSource: Send + Sync {
    fn current_live(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<CurrentLive, DashboardError>> + Send;

    fn snapshot(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<AggregateSnapshot, DashboardError>> + Send;
}

impl DashboardSource for Arc<SessionHub> {
    async fn current_live(&self, group_id: GroupId) -> Result<CurrentLive, DashboardError> {
        Ok(SessionHub::current_live(self, group_id).await)
    }

    async fn snapshot(&self, session_id: SessionId) -> Result<AggregateSnapshot, DashboardError> {
        SessionHub::snapshot(self, session_id).await.map_err(|e| match e {
            SessionError::SessionNotFound(id) => DashboardError::SessionNotFound(id),
            other => DashboardError::Unavailable(other.to_string()),
        })
    }
}

#[cfg(feature = "client")]
impl DashboardSource for crate::client::SessionClient {
    async fn current_live(&self, group_id: GroupId) -> Result<CurrentLive, DashboardError> {
        crate::client::SessionClient::current_live(self, group_id)
            .await
            .map_err(|e| DashboardError::Unavailable(e.to_string()))
    }

    async fn snapshot(&self, session_id: SessionId) -> Result<AggregateSnapshot, DashboardError> {
        use crate::client::ClientError;
        crate::client::SessionClient::snapshot(self, session_id)
            .await
            .map_err(|e| match e {
                ClientError::SessionNotFound(_) => DashboardError::SessionNotFound(session_id),
                other => DashboardError::Unavailable(other.to_string()),
            })
    }
}

/// A live session the dashboard has attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveView {
    pub session_id: SessionId,
    pub topic: String,
    pub start_time: DateTime<Utc>,
}

impl LiveView {
    /// Build a view from the crash-recovery answer, if a session is live.
    pub fn from_current(current: &CurrentLive) -> Option<Self> {
        if !current.active {
            return None;
        }
        Some(Self {
            session_id: current.session_id?,
            topic: current.topic.clone().unwrap_or_default(),
            start_time: current.start_time?,
        })
    }

    /// Elapsed live time at `now`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.start_time).max(chrono::Duration::zero())
    }
}

/// Format an elapsed duration as `HH:MM:SS`.
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// What a poll produced.
#[derive(Debug, Clone)]
pub enum PollEvent {
    Snapshot(AggregateSnapshot),
    /// The poll failed; the next one will try again
    Disconnected(String),
}

/// Why following stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowEnd {
    SessionEnded,
    Cancelled,
}

/// Polling dashboard driver.
pub struct Dashboard<S> {
    source: S,
    poll_interval: Duration,
}

impl<S: DashboardSource> Dashboard<S> {
    pub fn new(source: S, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
        }
    }

    /// Crash recovery: find the group's live session, if any.
    pub async fn recover(&self, group_id: GroupId) -> Result<Option<LiveView>, DashboardError> {
        let current = self.source.current_live(group_id).await?;
        let view = LiveView::from_current(&current);
        if let Some(view) = &view {
            tracing::info!(
                group_id,
                session_id = view.session_id,
                elapsed = %format_elapsed(view.elapsed(Utc::now())),
                "recovered live session"
            );
        }
        Ok(view)
    }

    /// Poll a session's snapshot until it ends or `cancel` fires.
    ///
    /// Transient failures are reported as [`PollEvent::Disconnected`] and do
    /// not stop polling. An unknown session does.
    pub async fn follow<F>(
        &self,
        session_id: SessionId,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<FollowEnd, DashboardError>
    where
        F: FnMut(PollEvent),
    {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(FollowEnd::Cancelled),
                _ = ticker.tick() => {}
            }

            match self.source.snapshot(session_id).await {
                Ok(snapshot) => {
                    let ended = snapshot.state == SessionState::Ended;
                    on_event(PollEvent::Snapshot(snapshot));
                    if ended {
                        return Ok(FollowEnd::SessionEnded);
                    }
                }
                Err(DashboardError::SessionNotFound(id)) => {
                    return Err(DashboardError::SessionNotFound(id))
                }
                Err(DashboardError::Unavailable(reason)) => {
                    tracing::debug!(session_id, "snapshot poll failed: {reason}");
                    on_event(PollEvent::Disconnected(reason));
                }
            }
        }
    }
}
