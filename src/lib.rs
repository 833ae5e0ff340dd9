//! Classroom Pulse - live engagement telemetry for classroom sessions.
//!
//! Faculty schedule or start a session for a group. While it is live, each
//! student device captures a camera frame on a fixed cadence and submits it;
//! the server classifies the frame into an emotion label, keeps only the
//! latest label per student and serves aggregate snapshots to dashboards.
//!
//! # Privacy Guarantees
//!
//! - **No frame storage**: Frames are classified and dropped; only the label is kept
//! - **Live-only capture**: Nothing is accepted outside a live session
//! - **Stop on end**: Capture loops halt when the session ends or the student leaves
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Session Server                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────┐        │
//! │  │  Registry   │──▶│  Telemetry   │──▶│  Snapshot   │        │
//! │  │ (lifecycle) │   │  Ingestor    │   │  Builder    │        │
//! │  └─────────────┘   └──────────────┘   └─────────────┘        │
//! │         ▲                 ▲                  │               │
//! └─────────┼─────────────────┼──────────────────┼───────────────┘
//!           │                 │                  ▼
//!      ┌─────────┐      ┌───────────┐      ┌───────────┐
//!      │ Faculty │      │  Capture  │      │ Dashboard │
//!      │   CLI   │      │   Loop    │      │   Sync    │
//!      └─────────┘      └───────────┘      └───────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use classroom_pulse::core::{HintClassifier, HubConfig, SessionHub};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), classroom_pulse::core::SessionError> {
//! let hub = SessionHub::new(Arc::new(HintClassifier), HubConfig::default());
//! let started = hub.start_instant(7, "Binary Trees").await?;
//! let snapshot = hub.snapshot(started.session_id).await?;
//! assert_eq!(snapshot.total_active, 0);
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod dashboard;
pub mod protocol;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub mod client;

// Re-export key types at crate root for convenience
pub use capture::{CaptureConfig, CaptureController, CaptureDevice, SampleSink, SyntheticCamera};
pub use config::{Config, ConfigError};
pub use core::{
    AggregateSnapshot, AttendanceSummary, Classifier, CurrentLive, EmotionLabel, HubConfig,
    SessionError, SessionHub, SessionState,
};
pub use dashboard::{Dashboard, DashboardSource, LiveView};

#[cfg(feature = "server")]
pub use server::{run as run_server, ServerConfig};

#[cfg(feature = "client")]
pub use client::{ClientConfig, ClientError, SessionClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration shown to students before they join.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              CLASSROOM PULSE - PRIVACY DECLARATION               ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This client reports classroom engagement while a class is live. ║
║                                                                  ║
║  ✓ WHAT WE CAPTURE:                                              ║
║    • One camera frame every few seconds, only while live         ║
║    • The emotion label derived from that frame                   ║
║    • When your latest label was recorded                         ║
║                                                                  ║
║  ✗ WHAT WE NEVER KEEP:                                           ║
║    • The frames themselves (dropped after classification)        ║
║    • Audio of any kind                                           ║
║    • Anything captured before or after the session               ║
║                                                                  ║
║  Capture stops as soon as the faculty ends the session or        ║
║  you leave. You can view what was sent anytime with:             ║
║    classroom-pulse join ... (summary printed on exit)            ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_declaration_contents() {
        assert!(PRIVACY_DECLARATION.contains("PRIVACY"));
        assert!(PRIVACY_DECLARATION.contains("NEVER KEEP"));
        assert!(PRIVACY_DECLARATION.contains("dropped after classification"));
    }
}
