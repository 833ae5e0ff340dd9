//! Emotion labels, frames and the classification seam.
//!
//! Frames cross the ingestion boundary only long enough to be classified.
//! Nothing downstream of [`Classifier::classify`] ever sees the pixels.

use crate::core::error::{ClassificationError, SessionError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classroom affect label derived from a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EmotionLabel {
    Focused,
    Confused,
    Bored,
    Distracted,
    Happy,
    /// Neutral label recorded when classification fails
    Unknown,
}

impl EmotionLabel {
    /// All labels in declaration order.
    pub const ALL: [EmotionLabel; 6] = [
        EmotionLabel::Focused,
        EmotionLabel::Confused,
        EmotionLabel::Bored,
        EmotionLabel::Distracted,
        EmotionLabel::Happy,
        EmotionLabel::Unknown,
    ];

    /// Map a raw detector emotion (e.g. `happy`, `fear`) onto a classroom label.
    pub fn from_raw_emotion(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "happy" | "neutral" | "surprise" => EmotionLabel::Focused,
            "sad" | "fear" => EmotionLabel::Confused,
            "angry" | "disgust" => EmotionLabel::Distracted,
            _ => EmotionLabel::Bored,
        }
    }

    /// Labels that raise the engagement score.
    pub fn is_positive(self) -> bool {
        matches!(self, EmotionLabel::Focused | EmotionLabel::Happy)
    }

    /// Labels that lower the engagement score.
    pub fn is_negative(self) -> bool {
        matches!(
            self,
            EmotionLabel::Confused | EmotionLabel::Bored | EmotionLabel::Distracted
        )
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmotionLabel::Focused => "Focused",
            EmotionLabel::Confused => "Confused",
            EmotionLabel::Bored => "Bored",
            EmotionLabel::Distracted => "Distracted",
            EmotionLabel::Happy => "Happy",
            EmotionLabel::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

/// A single captured frame.
///
/// Holds the decoded image bytes. Dropped as soon as it has been classified.
#[derive(Clone)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Decode a wire payload: plain base64 or a `data:<mime>;base64,<payload>` URL.
    ///
    /// An empty payload is a request error. A payload that is not valid base64
    /// yields `Ok(None)` so the caller can treat it as a classification failure.
    pub fn decode_wire(payload: &str) -> Result<Option<Self>, SessionError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(SessionError::MissingFrame);
        }

        let encoded = match payload.split_once(',') {
            Some((header, data)) if header.starts_with("data:") => data,
            _ => payload,
        };
        if encoded.is_empty() {
            return Err(SessionError::MissingFrame);
        }

        Ok(STANDARD.decode(encoded).ok().map(Self::from_bytes))
    }

    /// Encode as a JPEG data URL for submission.
    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(&self.bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Frame contents never end up in logs.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("len", &self.bytes.len()).finish()
    }
}

/// The external affect classifier.
///
/// Implementations may block; the hub runs them on the blocking pool.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, frame: &Frame) -> Result<EmotionLabel, ClassificationError>;
}

/// Classifier that reads the frame bytes as a raw emotion name.
///
/// Pairs with [`SyntheticCamera`](crate::capture::SyntheticCamera), which emits
/// such frames, and lets the whole pipeline run without a vision model.
#[derive(Debug, Clone, Copy, Default)]
pub struct HintClassifier;

impl Classifier for HintClassifier {
    fn classify(&self, frame: &Frame) -> Result<EmotionLabel, ClassificationError> {
        let raw = std::str::from_utf8(frame.as_bytes())
            .map_err(|e| ClassificationError::Failed(e.to_string()))?
            .trim();
        if raw.is_empty() {
            return Err(ClassificationError::NoFace);
        }
        Ok(EmotionLabel::from_raw_emotion(raw))
    }
}
