//! drishti-percept: Perception core for the Drishti pipeline
//!
//! Routes camera frames through one or more inference backends depending
//! on the active operating mode, smooths their outputs, and hands accepted
//! results to the alert layer. Owns the scheduling guarantees: debounced
//! mode switching, at-most-one in-flight inference per backend, adaptive
//! frame rate, retry with backoff, and per-backend circuit breakers.

pub mod backends;
pub mod circuit;
pub mod config;
pub mod device;
pub mod error;
pub mod handoff;
pub mod metrics;
pub mod orchestrator;
pub mod preprocess;
pub mod smoothing;
pub mod tensor;

pub use backends::{
    BackendAdapter, EngineFault, EngineLoader, InferenceEngine, RawDetection, RawOutput,
};
pub use circuit::{CircuitBreaker, CircuitState};
pub use config::{FpsProfile, PerceptConfig};
pub use device::{DeviceStatus, StaticDeviceStatus};
pub use error::PerceptError;
pub use handoff::FrameSlot;
pub use metrics::MetricsAggregator;
pub use orchestrator::{FrameOutcome, ModeOrchestrator};
pub use preprocess::FramePreprocessor;
pub use tensor::{Tensor, TensorShape};
