//! Event and metrics payloads exposed to the UI layer
//!
//! The pipeline pushes state changes over an explicit broadcast channel
//! instead of holding references into UI objects; everything here is
//! read-only from the UI's perspective.

use crate::types::{Alert, Detection, ModelFamily, OperatingMode, SmoothedPrediction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Events emitted by the pipeline over its broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    ModeChanged {
        from: OperatingMode,
        to: OperatingMode,
    },
    /// An accepted (quorum-passing) sign prediction.
    Prediction(SmoothedPrediction),
    /// Stabilized object detections for one processing cycle.
    Detections {
        detections: Vec<Detection>,
        degraded: bool,
    },
    /// An alert finished playing on the audio/haptic channel.
    AlertPlayed(Alert),
    /// A primary backend is unavailable and a secondary is covering for it.
    BackendDegraded {
        requested: ModelFamily,
        fallback: ModelFamily,
    },
    /// A user-visible failure with a human-readable cause and, where
    /// recoverable, a suggested action.
    Fault {
        message: String,
        action: Option<String>,
    },
}

/// Point-in-time health snapshot, pull-based.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub frames_corrupted: u64,
    pub inference_count: u64,
    pub inference_errors: u64,
    pub retries: u64,
    pub average_latency_ms: f64,
    pub current_fps: f64,
    pub duplicates_filtered: u64,
    /// Backend name -> breaker state ("closed" / "open" / "half-open").
    pub circuit_states: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_default_is_zeroed() {
        let snap = MetricsSnapshot::default();
        assert_eq!(snap.frames_received, 0);
        assert_eq!(snap.inference_errors, 0);
        assert!(snap.circuit_states.is_empty());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut snap = MetricsSnapshot::default();
        snap.frames_received = 42;
        snap.circuit_states
            .insert("detector".to_string(), "open".to_string());
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"frames_received\":42"));
        assert!(json.contains("\"detector\":\"open\""));
    }

    #[test]
    fn test_event_roundtrip() {
        let event = PipelineEvent::ModeChanged {
            from: OperatingMode::Idle,
            to: OperatingMode::ObjectDetection,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: PipelineEvent = serde_json::from_str(&json).unwrap();
        match back {
            PipelineEvent::ModeChanged { from, to } => {
                assert_eq!(from, OperatingMode::Idle);
                assert_eq!(to, OperatingMode::ObjectDetection);
            }
            _ => panic!("Expected ModeChanged"),
        }
    }
}
