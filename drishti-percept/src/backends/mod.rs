//! Inference backend adapters
//!
//! Model runtimes are opaque behind [`InferenceEngine`]; the adapter owns
//! the load lifecycle (extension check, missing-vs-corrupt distinction,
//! hard wall-clock load timeout) and wraps every inference call in a
//! deadline on the blocking pool so a hung model never stalls the
//! processing task.

pub mod classifier;
pub mod detector;
pub mod sequence;

use crate::error::PerceptError;
use crate::tensor::{Tensor, TensorShape};
use drishti_core::ModelFamily;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use classifier::SIGN_LABELS;
pub use detector::COCO_CLASSES;
pub use sequence::SequenceAccumulator;

/// Model file extension accepted by the loader.
const MODEL_EXTENSION: &str = "tflite";

/// A failure reported by the underlying runtime.
#[derive(Debug, Clone)]
pub enum EngineFault {
    /// Momentary failure (scheduling, delegate hiccup); worth retrying
    Transient(String),
    /// Resource pressure (memory, NNAPI contention); worth retrying
    Resource(String),
    /// Corrupt model, incompatible shape; retrying cannot help
    Fatal(String),
}

impl EngineFault {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, EngineFault::Fatal(_))
    }

    fn detail(&self) -> &str {
        match self {
            EngineFault::Transient(s) | EngineFault::Resource(s) | EngineFault::Fatal(s) => s,
        }
    }
}

/// Raw output of one inference call, decoded per family.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    /// Per-class scores (classifier and sequence families)
    pub scores: Vec<f32>,
    /// Frame feature embedding (classifier family)
    pub features: Option<Vec<f32>>,
    /// Raw boxes (detector family), normalized coordinates
    pub boxes: Vec<RawDetection>,
}

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub class_id: usize,
    pub score: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// The opaque model runtime contract. `infer` is synchronous; the adapter
/// runs it on the blocking pool.
pub trait InferenceEngine: Send + Sync {
    fn infer(&self, input: &Tensor) -> Result<RawOutput, EngineFault>;
    fn input_shape(&self) -> TensorShape;
    fn name(&self) -> &str;
}

/// Constructs an engine from a model file. Runs on the blocking pool under
/// the load timeout; a `String` error describes a read/parse failure.
pub type EngineLoader =
    Arc<dyn Fn(&Path) -> Result<Box<dyn InferenceEngine>, String> + Send + Sync>;

/// One loaded backend: engine plus load/infer policy.
pub struct BackendAdapter {
    family: ModelFamily,
    engine: Arc<dyn InferenceEngine>,
}

impl std::fmt::Debug for BackendAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendAdapter")
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

impl BackendAdapter {
    /// Load a model file into an engine.
    ///
    /// Unknown extensions are rejected before the file is touched, a
    /// missing file is distinguished from unreadable content, and the
    /// loader runs under a hard wall-clock timeout. On expiry the
    /// partially-started load is abandoned and `LoadTimeout` raised, so a
    /// hung load cannot block the mode from ever becoming usable.
    pub async fn load(
        family: ModelFamily,
        path: PathBuf,
        loader: EngineLoader,
        timeout: Duration,
    ) -> Result<Self, PerceptError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case(MODEL_EXTENSION) => {}
            other => {
                return Err(PerceptError::LoadFormat {
                    model: family.to_string(),
                    detail: format!("unknown file extension {:?}", other.unwrap_or("")),
                });
            }
        }

        if !path.exists() {
            return Err(PerceptError::LoadFileMissing { path });
        }

        let load_path = path.clone();
        let load = tokio::task::spawn_blocking(move || loader(&load_path));

        let engine = match tokio::time::timeout(timeout, load).await {
            Ok(Ok(Ok(engine))) => engine,
            Ok(Ok(Err(detail))) => {
                return Err(PerceptError::LoadFormat {
                    model: family.to_string(),
                    detail,
                });
            }
            Ok(Err(join_err)) => {
                return Err(PerceptError::LoadFormat {
                    model: family.to_string(),
                    detail: format!("loader panicked: {}", join_err),
                });
            }
            Err(_) => {
                warn!(
                    "Abandoning {} model load after {:?} timeout",
                    family, timeout
                );
                return Err(PerceptError::LoadTimeout {
                    model: family.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        };

        info!("Loaded {} model from {:?}", family, path);
        Ok(Self {
            family,
            engine: Arc::from(engine),
        })
    }

    /// Wrap an already-constructed engine (tests, in-memory models).
    pub fn from_engine(family: ModelFamily, engine: Arc<dyn InferenceEngine>) -> Self {
        Self { family, engine }
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn input_shape(&self) -> TensorShape {
        self.engine.input_shape()
    }

    /// Run one inference call under a deadline.
    ///
    /// Runtime faults are never swallowed; each becomes a typed error
    /// carrying whether it is retryable. Deadline expiry counts as
    /// retryable since the model itself may recover.
    pub async fn infer(&self, input: Tensor, timeout: Duration) -> Result<RawOutput, PerceptError> {
        let engine = self.engine.clone();
        let call = tokio::task::spawn_blocking(move || engine.infer(&input));

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(fault))) => Err(PerceptError::Inference {
                detail: fault.detail().to_string(),
                retryable: fault.is_retryable(),
            }),
            Ok(Err(join_err)) => Err(PerceptError::Inference {
                detail: format!("inference task panicked: {}", join_err),
                retryable: false,
            }),
            Err(_) => Err(PerceptError::Inference {
                detail: format!("inference timed out after {:?}", timeout),
                retryable: true,
            }),
        }
    }
}
