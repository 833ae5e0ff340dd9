//! Privacy-preserving capture statistics.
//!
//! Counts what the capture loop did without keeping any frame or label
//! history, so a student can see exactly how much was sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for one capture session.
#[derive(Debug)]
pub struct CaptureStats {
    /// Frames grabbed from the device
    frames_captured: AtomicU64,
    /// Device errors while grabbing a frame
    capture_failures: AtomicU64,
    /// Submissions the server accepted
    samples_accepted: AtomicU64,
    /// Submissions refused because the session ended
    submissions_rejected: AtomicU64,
    /// Submissions that failed for any other reason
    submissions_failed: AtomicU64,
    /// Submissions abandoned after the per-tick timeout
    submissions_timed_out: AtomicU64,
    started_at: DateTime<Utc>,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            capture_failures: AtomicU64::new(0),
            samples_accepted: AtomicU64::new(0),
            submissions_rejected: AtomicU64::new(0),
            submissions_failed: AtomicU64::new(0),
            submissions_timed_out: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_failure(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_accepted(&self) {
        self.samples_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_rejected(&self) {
        self.submissions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_failed(&self) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_timed_out(&self) {
        self.submissions_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            submissions_rejected: self.submissions_rejected.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            submissions_timed_out: self.submissions_timed_out.load(Ordering::Relaxed),
            started_at: self.started_at,
            duration_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Capture Statistics:\n\
             - Frames captured: {}\n\
             - Samples accepted: {}\n\
             - Failed submissions: {} ({} timed out)\n\
             - Capture errors: {}\n\
             - Duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - Frames are discarded right after classification\n\
             - Only the derived label is kept by the server",
            stats.frames_captured,
            stats.samples_accepted,
            stats.submissions_failed + stats.submissions_timed_out,
            stats.submissions_timed_out,
            stats.capture_failures,
            stats.duration_secs
        )
    }
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStatsSnapshot {
    pub frames_captured: u64,
    pub capture_failures: u64,
    pub samples_accepted: u64,
    pub submissions_rejected: u64,
    pub submissions_failed: u64,
    pub submissions_timed_out: u64,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
}

/// Thread-safe shared capture statistics.
pub type SharedCaptureStats = Arc<CaptureStats>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = CaptureStats::new();
        stats.record_frame_captured();
        stats.record_frame_captured();
        stats.record_sample_accepted();
        stats.record_submission_timed_out();

        let snapshot = stats.stats();
        assert_eq!(snapshot.frames_captured, 2);
        assert_eq!(snapshot.samples_accepted, 1);
        assert_eq!(snapshot.submissions_timed_out, 1);
        assert_eq!(snapshot.submissions_rejected, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = CaptureStats::new();
        stats.record_submission_failed();
        stats.record_submission_timed_out();
        let summary = stats.summary();

        assert!(summary.contains("Frames captured: 0"));
        assert!(summary.contains("Failed submissions: 2 (1 timed out)"));
        assert!(summary.contains("Privacy Guarantee"));
    }
}
