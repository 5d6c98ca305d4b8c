//! drishti-cns: Pipeline composition for Drishti
//!
//! Wires the perception core and the alert layer into one explicitly
//! constructed, explicitly owned pipeline object: a frame-acceptance side
//! that never blocks the camera, a processing task connected by a
//! single-slot handoff, a command channel for mode switches, and a
//! broadcast event channel toward the UI.

pub mod pipeline;

pub use pipeline::{EngineRegistry, PerceptionPipeline, PipelineConfig};
