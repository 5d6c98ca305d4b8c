//! Shared data model for the perception pipeline

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raw camera frame as pushed by the camera collaborator.
///
/// Planes are reference-counted so a frame can be cloned into the handoff
/// slot without copying pixel data. Supported layouts: one packed RGB8
/// plane, one grayscale plane, or three planar YUV420 planes. Validity is
/// enforced by the preprocessor, not by this type.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Bytes>,
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    pub fn new(width: u32, height: u32, planes: Vec<Bytes>) -> Self {
        Self {
            width,
            height,
            planes,
            timestamp: Utc::now(),
        }
    }
}

/// Model family a backend belongs to. Exactly one backend per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    /// Static sign classifier (per-frame)
    Classifier,
    /// Temporal sequence model over accumulated frame features
    Sequence,
    /// Object detector (boxes + classes)
    Detector,
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFamily::Classifier => write!(f, "classifier"),
            ModelFamily::Sequence => write!(f, "sequence"),
            ModelFamily::Detector => write!(f, "detector"),
        }
    }
}

/// Bounding box normalized to frame dimensions (all fields in [0, 1]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Horizontal center, used for spatial placement.
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }
}

/// One raw model output, produced by a backend adapter and consumed by the
/// smoothing layer.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub family: ModelFamily,
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    /// Present for the detector family only.
    pub bbox: Option<BoundingBox>,
    /// Frame feature embedding, present for the classifier family and
    /// consumed by the sequence model's accumulation window.
    pub features: Option<Vec<f32>>,
    pub frame_timestamp: DateTime<Utc>,
}

/// A stabilized prediction emitted once a smoothing window reaches quorum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothedPrediction {
    pub label: String,
    /// Mean confidence over the window entries that agreed on the label.
    pub confidence: f32,
    /// How many window entries agreed.
    pub support: usize,
    /// Window length at the time of aggregation.
    pub window_len: usize,
    /// Set when the result came from a fallback backend.
    pub degraded: bool,
}

/// A stabilized object detection, ready for the alert path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub distance_feet: Option<f32>,
}

/// The single active operating context. Exactly one mode is active at a
/// time; transitions are gated by the orchestrator's dwell timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingMode {
    /// Dashboard, no camera processing
    Idle,
    /// Sign language translation (classifier + temporal sequence)
    SignTranslation,
    /// Environment object detection
    ObjectDetection,
    /// Ambient sound alerts (microphone collaborator, no camera routing)
    SoundAlert,
    /// Hosted conversational assistant (no camera routing)
    AssistantChat,
}

impl OperatingMode {
    /// Backend families this mode routes camera frames to.
    pub fn backends(&self) -> &'static [ModelFamily] {
        match self {
            OperatingMode::SignTranslation => &[ModelFamily::Classifier, ModelFamily::Sequence],
            OperatingMode::ObjectDetection => &[ModelFamily::Detector],
            OperatingMode::Idle | OperatingMode::SoundAlert | OperatingMode::AssistantChat => &[],
        }
    }

    pub fn uses_camera(&self) -> bool {
        !self.backends().is_empty()
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatingMode::Idle => write!(f, "idle"),
            OperatingMode::SignTranslation => write!(f, "sign-translation"),
            OperatingMode::ObjectDetection => write!(f, "object-detection"),
            OperatingMode::SoundAlert => write!(f, "sound-alert"),
            OperatingMode::AssistantChat => write!(f, "assistant-chat"),
        }
    }
}

/// Alert priority tier, ordered Low < Medium < High < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertTier {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AlertTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertTier::Low => write!(f, "low"),
            AlertTier::Medium => write!(f, "medium"),
            AlertTier::High => write!(f, "high"),
            AlertTier::Critical => write!(f, "critical"),
        }
    }
}

/// Horizontal zone of a detection relative to frame width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Zone {
    Left,
    Center,
    Right,
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Zone::Left => write!(f, "left"),
            Zone::Center => write!(f, "center"),
            Zone::Right => write!(f, "right"),
        }
    }
}

/// A spoken/haptic alert. Lives from creation until played or superseded
/// by the dedup/cooldown rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub label: String,
    pub tier: AlertTier,
    pub zone: Option<Zone>,
    pub distance_feet: Option<f32>,
    /// Fully phrased message handed to the playback sink.
    pub message: String,
    /// label + coarse distance bucket; repeats within the cooldown are dropped.
    pub dedup_key: String,
    pub created_at: DateTime<Utc>,
}
