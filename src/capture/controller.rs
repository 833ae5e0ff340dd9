//! The client capture loop as an explicit state machine.
//!
//! ```text
//!   Idle ──join (permission granted)──▶ Capturing ──leave──────────▶ Stopped(Left)
//!    │                                     │
//!    └─ permission denied: stays Idle      └─ SessionNotLive ─▶ Stopped(SessionEnded)
//! ```
//!
//! The loop is a single tokio task driven by an interval. Cancellation comes
//! from exactly two places: the user's leave action (a [`CancellationToken`])
//! and a `SessionNotLive` rejection from the server.

use crate::capture::device::{CaptureDevice, DeviceError};
use crate::capture::sink::{SampleSink, SubmitError};
use crate::capture::stats::{CaptureStats, SharedCaptureStats};
use crate::core::{EmotionLabel, ProfileUpdate, SampleSubmission, SessionId, StudentId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const NOTICE_PERMISSION_DENIED: &str = "Camera access denied.";
pub const NOTICE_CLASS_ENDED: &str = "Class dismissed: the faculty has ended this session.";

/// What the loop submits and how often.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub profile: ProfileUpdate,
    /// Time between ticks
    pub interval: Duration,
    /// Bound on one submission; a slower one counts as a failed tick
    pub submit_timeout: Duration,
}

impl CaptureConfig {
    pub fn new(session_id: SessionId, student_id: StudentId) -> Self {
        Self {
            session_id,
            student_id,
            profile: ProfileUpdate::default(),
            interval: Duration::from_secs(5),
            submit_timeout: Duration::from_secs(4),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user left
    Left,
    /// The server reported the session is no longer live
    SessionEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Capturing,
    Stopped(StopReason),
}

/// Client-local view of the capture loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStatus {
    pub phase: CapturePhase,
    pub sample_count: u64,
    /// Label of the most recent accepted sample
    pub last_label: Option<EmotionLabel>,
    /// User-visible message, if any
    pub notice: Option<String>,
}

impl CaptureStatus {
    fn idle() -> Self {
        Self {
            phase: CapturePhase::Idle,
            sample_count: 0,
            last_label: None,
            notice: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("capture device failed to open: {0}")]
    Device(DeviceError),
    #[error("capture already started")]
    AlreadyStarted,
}

/// Drives one device's capture loop.
pub struct CaptureController {
    config: CaptureConfig,
    status: watch::Sender<CaptureStatus>,
    stats: SharedCaptureStats,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CaptureController {
    /// Create a controller in the `Idle` phase.
    pub fn new(config: CaptureConfig) -> Self {
        let (status, _) = watch::channel(CaptureStatus::idle());
        Self {
            config,
            status,
            stats: Arc::new(CaptureStats::new()),
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn status(&self) -> CaptureStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureStatus> {
        self.status.subscribe()
    }

    pub fn stats(&self) -> SharedCaptureStats {
        self.stats.clone()
    }

    /// Open the device and start capturing.
    ///
    /// A denied permission leaves the controller `Idle` with a notice and is
    /// not retried. Must be called from within a tokio runtime.
    pub fn join<D, S>(&mut self, mut device: D, sink: S) -> Result<(), CaptureError>
    where
        D: CaptureDevice,
        S: SampleSink,
    {
        if self.status.borrow().phase != CapturePhase::Idle {
            return Err(CaptureError::AlreadyStarted);
        }

        if let Err(e) = device.open() {
            tracing::warn!(session_id = self.config.session_id, "capture device not opened: {e}");
            let error = match e {
                DeviceError::PermissionDenied => {
                    self.status
                        .send_modify(|s| s.notice = Some(NOTICE_PERMISSION_DENIED.to_string()));
                    CaptureError::PermissionDenied
                }
                other => {
                    self.status.send_modify(|s| s.notice = Some(other.to_string()));
                    CaptureError::Device(other)
                }
            };
            return Err(error);
        }

        self.status.send_modify(|s| {
            s.phase = CapturePhase::Capturing;
            s.notice = None;
        });
        tracing::info!(
            session_id = self.config.session_id,
            student_id = self.config.student_id,
            interval_secs = self.config.interval.as_secs_f64(),
            "capture started"
        );

        let worker = CaptureWorker {
            device,
            sink,
            config: self.config.clone(),
            status: self.status.clone(),
            stats: self.stats.clone(),
            cancel: self.cancel.clone(),
        };
        self.handle = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Stop capturing now. Once this returns the device is released and no
    /// further submissions are made.
    pub async fn leave(&mut self) -> CapturePhase {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("capture task failed to join: {e}");
            }
        }
        self.status.send_if_modified(|s| match s.phase {
            CapturePhase::Stopped(_) => false,
            _ => {
                s.phase = CapturePhase::Stopped(StopReason::Left);
                true
            }
        });
        self.status.borrow().phase
    }

    /// Wait until the loop stops on its own or through [`leave`](Self::leave).
    pub async fn stopped(&self) -> StopReason {
        let mut rx = self.status.subscribe();
        loop {
            if let CapturePhase::Stopped(reason) = rx.borrow_and_update().phase {
                return reason;
            }
            if rx.changed().await.is_err() {
                return StopReason::Left;
            }
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum TickOutcome {
    Continue,
    SessionEnded,
    Cancelled,
}

/// State moved into the capture task.
struct CaptureWorker<D, S> {
    device: D,
    sink: S,
    config: CaptureConfig,
    status: watch::Sender<CaptureStatus>,
    stats: SharedCaptureStats,
    cancel: CancellationToken,
}

impl<D: CaptureDevice, S: SampleSink> CaptureWorker<D, S> {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StopReason::Left,
                _ = ticker.tick() => match self.tick().await {
                    TickOutcome::Continue => {}
                    TickOutcome::SessionEnded => break StopReason::SessionEnded,
                    TickOutcome::Cancelled => break StopReason::Left,
                },
            }
        };

        self.device.release();
        self.status.send_modify(|s| {
            s.phase = CapturePhase::Stopped(reason);
            if reason == StopReason::SessionEnded {
                s.notice = Some(NOTICE_CLASS_ENDED.to_string());
            }
        });
        tracing::info!(
            session_id = self.config.session_id,
            student_id = self.config.student_id,
            reason = ?reason,
            "capture stopped"
        );
    }

    async fn tick(&mut self) -> TickOutcome {
        let frame = match self.device.capture() {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.record_capture_failure();
                tracing::warn!("frame capture failed: {e}");
                return TickOutcome::Continue;
            }
        };
        self.stats.record_frame_captured();

        let sample = SampleSubmission {
            session_id: self.config.session_id,
            student_id: self.config.student_id,
            frame: frame.to_data_url(),
            profile: self.config.profile.clone(),
        };
        drop(frame);

        let submission = tokio::time::timeout(self.config.submit_timeout, self.sink.submit(sample));
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return TickOutcome::Cancelled,
            result = submission => result,
        };

        match result {
            Ok(Ok(label)) => {
                self.stats.record_sample_accepted();
                self.status.send_modify(|s| {
                    s.sample_count += 1;
                    s.last_label = Some(label);
                });
                TickOutcome::Continue
            }
            Ok(Err(SubmitError::SessionNotLive)) => {
                self.stats.record_submission_rejected();
                TickOutcome::SessionEnded
            }
            Ok(Err(SubmitError::Transient(e))) => {
                self.stats.record_submission_failed();
                tracing::debug!("submission failed, retrying next tick: {e}");
                TickOutcome::Continue
            }
            Err(_) => {
                self.stats.record_submission_timed_out();
                tracing::warn!(
                    timeout_secs = self.config.submit_timeout.as_secs_f64(),
                    "submission timed out"
                );
                TickOutcome::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::SyntheticCamera;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Sink that replays a scripted sequence of results.
    struct ScriptedSink {
        script: Mutex<Vec<Result<EmotionLabel, SubmitError>>>,
        calls: Arc<AtomicU64>,
        delay: Duration,
    }

    impl ScriptedSink {
        fn new(mut script: Vec<Result<EmotionLabel, SubmitError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Arc::new(AtomicU64::new(0)),
                delay: Duration::ZERO,
            }
        }
    }

    impl SampleSink for ScriptedSink {
        async fn submit(&self, _sample: SampleSubmission) -> Result<EmotionLabel, SubmitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop();
            next.unwrap_or(Ok(EmotionLabel::Focused))
        }
    }

    fn config() -> CaptureConfig {
        CaptureConfig {
            interval: Duration::from_millis(20),
            submit_timeout: Duration::from_millis(10),
            ..CaptureConfig::new(1, 42)
        }
    }

    #[tokio::test]
    async fn test_permission_denied_stays_idle() {
        let mut controller = CaptureController::new(config());
        let err = controller
            .join(SyntheticCamera::denied(), ScriptedSink::new(vec![]))
            .unwrap_err();

        assert_eq!(err, CaptureError::PermissionDenied);
        let status = controller.status();
        assert_eq!(status.phase, CapturePhase::Idle);
        assert_eq!(status.notice.as_deref(), Some(NOTICE_PERMISSION_DENIED));
    }

    #[tokio::test]
    async fn test_session_not_live_stops_loop() {
        let camera = SyntheticCamera::new();
        let open = camera.open_flag();
        let sink = ScriptedSink::new(vec![
            Ok(EmotionLabel::Focused),
            Err(SubmitError::Transient("flaky".into())),
            Ok(EmotionLabel::Bored),
            Err(SubmitError::SessionNotLive),
        ]);
        let calls = sink.calls.clone();

        let mut controller = CaptureController::new(config());
        controller.join(camera, sink).unwrap();
        assert_eq!(controller.status().phase, CapturePhase::Capturing);

        let reason = tokio::time::timeout(Duration::from_secs(2), controller.stopped())
            .await
            .unwrap();
        assert_eq!(reason, StopReason::SessionEnded);

        // Give the worker time to run past the stop if it were still alive
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(!open.load(Ordering::SeqCst));

        let status = controller.status();
        assert_eq!(status.sample_count, 2);
        assert_eq!(status.last_label, Some(EmotionLabel::Bored));
        assert_eq!(status.notice.as_deref(), Some(NOTICE_CLASS_ENDED));

        let stats = controller.stats().stats();
        assert_eq!(stats.samples_accepted, 2);
        assert_eq!(stats.submissions_failed, 1);
        assert_eq!(stats.submissions_rejected, 1);

        assert_eq!(
            controller.leave().await,
            CapturePhase::Stopped(StopReason::SessionEnded)
        );
    }

    #[tokio::test]
    async fn test_leave_releases_device_and_stops_submissions() {
        let camera = SyntheticCamera::new();
        let open = camera.open_flag();
        let sink = ScriptedSink::new(vec![]);
        let calls = sink.calls.clone();

        let mut controller = CaptureController::new(config());
        controller.join(camera, sink).unwrap();
        assert!(open.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(70)).await;
        let phase = controller.leave().await;
        assert_eq!(phase, CapturePhase::Stopped(StopReason::Left));
        assert!(!open.load(Ordering::SeqCst));

        let after_leave = calls.load(Ordering::SeqCst);
        assert!(after_leave >= 1);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_leave);
    }

    #[tokio::test]
    async fn test_slow_submission_times_out_and_continues() {
        let mut sink = ScriptedSink::new(vec![]);
        sink.delay = Duration::from_millis(50);
        let calls = sink.calls.clone();

        let mut controller = CaptureController::new(config());
        controller.join(SyntheticCamera::new(), sink).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        controller.leave().await;

        let stats = controller.stats().stats();
        assert!(stats.submissions_timed_out >= 2);
        assert_eq!(stats.samples_accepted, 0);
        assert_eq!(controller.status().sample_count, 0);
        // At most one submission attempt per captured frame
        let calls = calls.load(Ordering::SeqCst);
        assert!(calls <= stats.frames_captured);
        assert!(calls + 1 >= stats.frames_captured);
    }

    #[tokio::test]
    async fn test_join_twice_rejected() {
        let mut controller = CaptureController::new(config());
        controller
            .join(SyntheticCamera::new(), ScriptedSink::new(vec![]))
            .unwrap();
        assert_eq!(
            controller
                .join(SyntheticCamera::new(), ScriptedSink::new(vec![]))
                .unwrap_err(),
            CaptureError::AlreadyStarted
        );
        controller.leave().await;
    }
}
