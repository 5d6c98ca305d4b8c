//! Static sign classifier decoding

use crate::backends::RawOutput;
use crate::error::PerceptError;
use chrono::{DateTime, Utc};
use drishti_core::{InferenceResult, ModelFamily};
use tracing::debug;

/// Label set of the static sign classifier (20 classes).
pub const SIGN_LABELS: &[&str] = &[
    "hello", "thank you", "please", "yes", "no", "help", "sorry", "good", "bad", "stop", "go",
    "water", "food", "bathroom", "home", "friend", "family", "love", "more", "done",
];

/// Decode raw classifier scores into a result, or `None` below threshold.
///
/// The feature embedding rides along for the sequence model's window.
pub fn decode(
    raw: &RawOutput,
    threshold: f32,
    frame_timestamp: DateTime<Utc>,
) -> Result<Option<InferenceResult>, PerceptError> {
    decode_scores(
        raw,
        ModelFamily::Classifier,
        threshold,
        frame_timestamp,
    )
}

/// Shared score decoding for the classifier and sequence families.
pub(crate) fn decode_scores(
    raw: &RawOutput,
    family: ModelFamily,
    threshold: f32,
    frame_timestamp: DateTime<Utc>,
) -> Result<Option<InferenceResult>, PerceptError> {
    if raw.scores.is_empty() {
        return Err(PerceptError::Inference {
            detail: format!("{} produced no class scores", family),
            retryable: false,
        });
    }
    if raw.scores.len() != SIGN_LABELS.len() {
        return Err(PerceptError::Inference {
            detail: format!(
                "{} produced {} scores, expected {}",
                family,
                raw.scores.len(),
                SIGN_LABELS.len()
            ),
            retryable: false,
        });
    }

    let Some((class_id, &confidence)) = raw
        .scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
    else {
        return Err(PerceptError::Inference {
            detail: format!("{} produced no class scores", family),
            retryable: false,
        });
    };

    if !confidence.is_finite() || confidence < threshold {
        debug!(
            "{} best score {:.3} below threshold {:.3}, suppressed",
            family, confidence, threshold
        );
        return Ok(None);
    }

    Ok(Some(InferenceResult {
        family,
        class_id,
        label: SIGN_LABELS[class_id].to_string(),
        confidence: confidence.clamp(0.0, 1.0),
        bbox: None,
        features: raw.features.clone(),
        frame_timestamp,
    }))
}
