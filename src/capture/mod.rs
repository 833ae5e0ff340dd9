//! Client-side capture loop.
//!
//! A device-local driver that, once the camera is granted, captures one frame
//! per cadence tick, submits it and stops itself when the server reports the
//! session has ended or the user leaves.

pub mod controller;
pub mod device;
pub mod sink;
pub mod stats;

// Re-export commonly used types
pub use controller::{
    CaptureConfig, CaptureController, CaptureError, CapturePhase, CaptureStatus, StopReason,
    NOTICE_CLASS_ENDED, NOTICE_PERMISSION_DENIED,
};
pub use device::{CaptureDevice, DeviceError, SyntheticCamera};
pub use sink::{SampleSink, SubmitError};
pub use stats::{CaptureStats, CaptureStatsSnapshot, SharedCaptureStats};
