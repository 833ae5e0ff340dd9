//! Capture devices for the client loop.
//!
//! A device is opened once (which is where the permission prompt happens),
//! yields one frame per tick and is released when the loop stops.

use crate::core::Frame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while using a capture device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("capture device is not open")]
    NotOpen,
    #[error("capture failed: {0}")]
    Capture(String),
}

/// A source of frames (a camera, in practice).
pub trait CaptureDevice: Send + 'static {
    /// Acquire the device. Fails with `PermissionDenied` if access is refused.
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Grab one frame.
    fn capture(&mut self) -> Result<Frame, DeviceError>;

    /// Release the device. Safe to call more than once.
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

/// Raw emotions the synthetic camera cycles through by default.
const DEFAULT_HINTS: [&str; 5] = ["neutral", "happy", "sad", "neutral", "surprise"];

/// A camera that emits raw-emotion hint frames instead of images.
///
/// Frames are readable by [`HintClassifier`](crate::core::HintClassifier),
/// which makes the full pipeline runnable on machines without a camera.
pub struct SyntheticCamera {
    hints: Vec<String>,
    next: usize,
    permission_granted: bool,
    open: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
}

impl SyntheticCamera {
    /// Create a camera with permission granted.
    pub fn new() -> Self {
        Self::with_hints(DEFAULT_HINTS.iter().map(|h| h.to_string()).collect())
    }

    /// Create a camera that cycles through the given raw emotions.
    pub fn with_hints(hints: Vec<String>) -> Self {
        Self {
            hints,
            next: 0,
            permission_granted: true,
            open: Arc::new(AtomicBool::new(false)),
            frames: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a camera whose permission prompt is always refused.
    pub fn denied() -> Self {
        Self {
            permission_granted: false,
            ..Self::new()
        }
    }

    /// Shared flag tracking whether the device is currently open.
    pub fn open_flag(&self) -> Arc<AtomicBool> {
        self.open.clone()
    }

    /// Shared counter of frames produced.
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        self.frames.clone()
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for SyntheticCamera {
    fn open(&mut self) -> Result<(), DeviceError> {
        if !self.permission_granted {
            return Err(DeviceError::PermissionDenied);
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, DeviceError> {
        if !self.is_open() {
            return Err(DeviceError::NotOpen);
        }
        if self.hints.is_empty() {
            return Err(DeviceError::Capture("no frames configured".to_string()));
        }
        let hint = &self.hints[self.next % self.hints.len()];
        self.next = self.next.wrapping_add(1);
        self.frames.fetch_add(1, Ordering::Relaxed);
        Ok(Frame::from_bytes(hint.as_bytes().to_vec()))
    }

    fn release(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
