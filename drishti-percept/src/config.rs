//! Configuration for the perception core

use drishti_core::ModelFamily;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Target frame-rate profile selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FpsProfile {
    /// Balanced base rate, adapted by battery and foreground state
    Auto,
    /// 10 fps base
    High,
    /// 5 fps base
    Balanced,
    /// 2 fps base
    BatterySaver,
}

impl FpsProfile {
    /// Base inter-frame interval before battery/foreground multipliers.
    pub fn base_interval(&self) -> Duration {
        match self {
            FpsProfile::High => Duration::from_millis(100),
            FpsProfile::Auto | FpsProfile::Balanced => Duration::from_millis(200),
            FpsProfile::BatterySaver => Duration::from_millis(500),
        }
    }
}

/// Perception configuration. Every recognized option is a field here;
/// defaults match the values the pipeline documents, and all of them are
/// tunable rather than mandated constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptConfig {
    /// Target frame-rate profile
    pub fps_profile: FpsProfile,

    /// Minimum confidence for a classifier result to enter smoothing
    pub classifier_confidence_threshold: f32,
    /// Minimum confidence for a sequence result to enter smoothing
    pub sequence_confidence_threshold: f32,
    /// Minimum confidence for a detector box to survive decoding
    pub detector_confidence_threshold: f32,

    /// Smoothing window bounds for the adaptive classifier buffer
    pub smoothing_window_min: usize,
    pub smoothing_window_max: usize,
    /// Feature steps the temporal sequence model consumes per inference
    pub sequence_length: usize,
    /// Fraction of a smoothing window that must agree on a label
    pub quorum: f32,

    /// Retry attempts after the initial inference call
    pub max_retries: u32,
    /// First retry delay; doubled per attempt up to the max
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    /// Per-call inference deadline
    pub inference_timeout_ms: u64,
    /// Wall-clock deadline for loading one model
    pub load_timeout_secs: u64,

    /// Consecutive surfaced failures before a backend's breaker opens
    pub breaker_failure_threshold: u32,
    /// How long an open breaker stays open before half-open
    pub breaker_cooldown_secs: u64,

    /// Minimum time between honored mode switches
    pub mode_dwell_ms: u64,
    /// Consecutive corrupted frames before the feed is declared faulty
    pub corrupted_streak_limit: u32,

    /// Directory holding the model files
    pub model_dir: PathBuf,
}

impl Default for PerceptConfig {
    fn default() -> Self {
        Self {
            fps_profile: FpsProfile::Auto,
            classifier_confidence_threshold: 0.7,
            sequence_confidence_threshold: 0.6,
            detector_confidence_threshold: 0.5,
            smoothing_window_min: 3,
            smoothing_window_max: 5,
            sequence_length: 15,
            quorum: 0.6,
            max_retries: 2,
            retry_initial_delay_ms: 100,
            retry_max_delay_ms: 1000,
            inference_timeout_ms: 2000,
            load_timeout_secs: 10,
            breaker_failure_threshold: 5,
            breaker_cooldown_secs: 300,
            mode_dwell_ms: 300,
            corrupted_streak_limit: 10,
            model_dir: PathBuf::from("./models"),
        }
    }
}

impl PerceptConfig {
    /// Confidence threshold for a backend family.
    pub fn confidence_threshold(&self, family: ModelFamily) -> f32 {
        match family {
            ModelFamily::Classifier => self.classifier_confidence_threshold,
            ModelFamily::Sequence => self.sequence_confidence_threshold,
            ModelFamily::Detector => self.detector_confidence_threshold,
        }
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn mode_dwell(&self) -> Duration {
        Duration::from_millis(self.mode_dwell_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("classifier", self.classifier_confidence_threshold),
            ("sequence", self.sequence_confidence_threshold),
            ("detector", self.detector_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} confidence threshold must be in [0, 1]", name));
            }
        }

        if self.smoothing_window_min < 2 {
            return Err("Smoothing window minimum must be at least 2".to_string());
        }
        if self.smoothing_window_max < self.smoothing_window_min {
            return Err("Smoothing window maximum must be >= minimum".to_string());
        }
        if self.smoothing_window_max > 30 {
            return Err("Smoothing window maximum must be <= 30".to_string());
        }

        if self.sequence_length == 0 || self.sequence_length > 120 {
            return Err("Sequence length must be between 1 and 120".to_string());
        }

        if !(0.0..=1.0).contains(&self.quorum) || self.quorum <= 0.0 {
            return Err("Quorum must be in (0, 1]".to_string());
        }

        if self.max_retries > 10 {
            return Err("Max retries must be <= 10".to_string());
        }
        if self.retry_initial_delay_ms == 0 || self.retry_max_delay_ms < self.retry_initial_delay_ms
        {
            return Err("Retry delays must be non-zero and max >= initial".to_string());
        }

        if self.inference_timeout_ms == 0 || self.inference_timeout_ms > 60_000 {
            return Err("Inference timeout must be between 1ms and 60s".to_string());
        }
        if self.load_timeout_secs == 0 || self.load_timeout_secs > 300 {
            return Err("Load timeout must be between 1s and 300s".to_string());
        }

        if self.breaker_failure_threshold == 0 {
            return Err("Breaker failure threshold must be non-zero".to_string());
        }
        if self.breaker_cooldown_secs == 0 {
            return Err("Breaker cooldown must be non-zero".to_string());
        }

        if self.corrupted_streak_limit == 0 {
            return Err("Corrupted streak limit must be non-zero".to_string());
        }

        Ok(())
    }
}
