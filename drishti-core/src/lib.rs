//! drishti-core: Shared data model for the Drishti perception pipeline
//!
//! Holds the types that cross crate boundaries: camera frames, inference
//! results, smoothed predictions, operating modes, alerts, and the event
//! and metrics payloads exposed to the UI layer.

pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use events::{MetricsSnapshot, PipelineEvent};
pub use types::{
    Alert, AlertTier, BoundingBox, Detection, Frame, InferenceResult, ModelFamily, OperatingMode,
    SmoothedPrediction, Zone,
};
