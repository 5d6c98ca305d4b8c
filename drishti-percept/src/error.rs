//! Error types for drishti-percept

use drishti_core::{Error as CoreError, ModelFamily, OperatingMode};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PerceptError {
    /// Persistent camera corruption: the corrupted-frame streak reached
    /// its limit with no valid frame in between.
    #[error("Camera feed corrupted: {consecutive} consecutive bad frames")]
    CameraFeedCorrupted { consecutive: u32 },

    #[error("Model load timed out after {seconds}s: {model}")]
    LoadTimeout { model: String, seconds: u64 },

    #[error("Model file missing: {path}")]
    LoadFileMissing { path: PathBuf },

    #[error("Model format invalid for {model}: {detail}")]
    LoadFormat { model: String, detail: String },

    #[error("Inference failed (retryable: {retryable}): {detail}")]
    Inference { detail: String, retryable: bool },

    #[error("Backend {backend} temporarily unavailable, retry in {cooldown_secs}s")]
    CircuitOpen {
        backend: ModelFamily,
        cooldown_secs: u64,
    },

    #[error("Mode switch to {requested} rejected: {remaining_ms}ms of dwell interval remain")]
    ModeSwitchRejected {
        requested: OperatingMode,
        remaining_ms: u64,
    },

    #[error("Backend {0} unavailable")]
    BackendUnavailable(ModelFamily),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PerceptError {
    /// Whether a failed operation may succeed if simply tried again.
    pub fn is_retryable(&self) -> bool {
        match self {
            PerceptError::Inference { retryable, .. } => *retryable,
            PerceptError::LoadTimeout { .. } => true,
            _ => false,
        }
    }

    /// Suggested user action for failures that reach the UI layer.
    pub fn suggested_action(&self) -> Option<&'static str> {
        match self {
            PerceptError::CameraFeedCorrupted { .. } => Some("check the camera"),
            PerceptError::LoadTimeout { .. } => Some("retry"),
            PerceptError::LoadFileMissing { .. } => Some("reinstall the model files"),
            PerceptError::LoadFormat { .. } => Some("reinstall the model files"),
            PerceptError::CircuitOpen { .. } => Some("retry later"),
            PerceptError::BackendUnavailable(_) => Some("open settings"),
            _ => None,
        }
    }
}

impl From<PerceptError> for CoreError {
    fn from(err: PerceptError) -> Self {
        match &err {
            PerceptError::CameraFeedCorrupted { .. } => CoreError::Frame(err.to_string()),
            PerceptError::LoadTimeout { .. }
            | PerceptError::LoadFileMissing { .. }
            | PerceptError::LoadFormat { .. } => CoreError::Model(err.to_string()),
            PerceptError::Inference { .. }
            | PerceptError::CircuitOpen { .. }
            | PerceptError::BackendUnavailable(_) => CoreError::Inference(err.to_string()),
            PerceptError::Config(_) => CoreError::Configuration(err.to_string()),
            _ => CoreError::Pipeline(err.to_string()),
        }
    }
}
