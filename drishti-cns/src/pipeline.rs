//! The composed perception pipeline

use drishti_alert::{AlertConfig, AlertQueue, PlaybackSink};
use drishti_core::{Error, Frame, MetricsSnapshot, ModelFamily, OperatingMode, PipelineEvent};
use drishti_percept::{
    BackendAdapter, DeviceStatus, EngineLoader, FrameOutcome, FrameSlot, InferenceEngine,
    MetricsAggregator, ModeOrchestrator, PerceptConfig, PerceptError,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Buffered events toward the UI; slow subscribers lose the oldest.
const EVENT_BUFFER_SIZE: usize = 256;
/// Pending mode-switch commands.
const COMMAND_BUFFER_SIZE: usize = 8;

/// Combined configuration surface for the whole pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub percept: PerceptConfig,
    pub alert: AlertConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.percept.validate()?;
        self.alert.validate()
    }
}

/// Default model filenames under `percept.model_dir`.
const CLASSIFIER_MODEL_FILE: &str = "sign_classifier.tflite";
const SEQUENCE_MODEL_FILE: &str = "sign_lstm.tflite";
const DETECTOR_MODEL_FILE: &str = "yolov11.tflite";

enum EngineSource {
    /// Load from a model file through an opaque loader.
    Loader { path: PathBuf, loader: EngineLoader },
    /// Use an already-constructed engine (tests, in-memory models).
    Engine(Arc<dyn InferenceEngine>),
}

/// Which engines to load for which backend family.
#[derive(Default)]
pub struct EngineRegistry {
    entries: Vec<(ModelFamily, EngineSource)>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model file for a family, at its default filename.
    pub fn register(&mut self, family: ModelFamily, model_dir: &std::path::Path, loader: EngineLoader) {
        let file = match family {
            ModelFamily::Classifier => CLASSIFIER_MODEL_FILE,
            ModelFamily::Sequence => SEQUENCE_MODEL_FILE,
            ModelFamily::Detector => DETECTOR_MODEL_FILE,
        };
        self.entries.push((
            family,
            EngineSource::Loader {
                path: model_dir.join(file),
                loader,
            },
        ));
    }

    /// Register a model file at an explicit path.
    pub fn register_path(&mut self, family: ModelFamily, path: PathBuf, loader: EngineLoader) {
        self.entries
            .push((family, EngineSource::Loader { path, loader }));
    }

    /// Register an already-constructed engine.
    pub fn register_engine(&mut self, family: ModelFamily, engine: Arc<dyn InferenceEngine>) {
        self.entries.push((family, EngineSource::Engine(engine)));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum PipelineCommand {
    SetMode {
        mode: OperatingMode,
        reply: oneshot::Sender<Result<OperatingMode, PerceptError>>,
    },
}

/// The composed pipeline. Explicitly constructed and owned; holds no
/// global state and no references into the UI layer.
pub struct PerceptionPipeline {
    config: Arc<PipelineConfig>,
    device: Arc<dyn DeviceStatus>,
    slot: Arc<FrameSlot>,
    metrics: Arc<MetricsAggregator>,
    alerts: Arc<AlertQueue>,
    events: broadcast::Sender<PipelineEvent>,
    command_tx: RwLock<Option<mpsc::Sender<PipelineCommand>>>,
    processing_handle: Mutex<Option<JoinHandle<()>>>,
    circuit_states: Arc<RwLock<HashMap<String, String>>>,
    is_running: RwLock<bool>,
}

impl PerceptionPipeline {
    pub fn new(
        config: PipelineConfig,
        device: Arc<dyn DeviceStatus>,
        sink: Arc<dyn PlaybackSink>,
    ) -> Result<Self, Error> {
        config
            .validate()
            .map_err(Error::Configuration)?;

        let alerts = Arc::new(AlertQueue::new(config.alert.clone(), sink).map_err(Error::from)?);
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);

        Ok(Self {
            config: Arc::new(config),
            device,
            slot: Arc::new(FrameSlot::new()),
            metrics: Arc::new(MetricsAggregator::new()),
            alerts,
            events,
            command_tx: RwLock::new(None),
            processing_handle: Mutex::new(None),
            circuit_states: Arc::new(RwLock::new(HashMap::new())),
            is_running: RwLock::new(false),
        })
    }

    /// Load backends and start the processing and drain tasks.
    ///
    /// A backend that fails to load is recorded and routed around; only a
    /// registry where every entry fails produces an error, since the
    /// pipeline would have nothing to serve.
    pub async fn start(&self, registry: EngineRegistry) -> Result<(), Error> {
        {
            let mut running = self.is_running.write();
            if *running {
                return Err(Error::Pipeline("Pipeline already running".to_string()));
            }
            *running = true;
        }

        info!("Starting perception pipeline");
        self.slot.reopen();

        let mut orchestrator = match ModeOrchestrator::new(
            Arc::new(self.config.percept.clone()),
            self.device.clone(),
            self.metrics.clone(),
        ) {
            Ok(orchestrator) => orchestrator,
            Err(err) => {
                *self.is_running.write() = false;
                return Err(err.into());
            }
        };

        let configured = registry.entries.len();
        let mut loaded = 0usize;
        for (family, source) in registry.entries {
            match source {
                EngineSource::Engine(engine) => {
                    orchestrator.install_backend(BackendAdapter::from_engine(family, engine));
                    loaded += 1;
                }
                EngineSource::Loader { path, loader } => {
                    match BackendAdapter::load(
                        family,
                        path,
                        loader,
                        self.config.percept.load_timeout(),
                    )
                    .await
                    {
                        Ok(adapter) => {
                            orchestrator.install_backend(adapter);
                            loaded += 1;
                        }
                        Err(err) => {
                            let _ = self.events.send(PipelineEvent::Fault {
                                message: err.to_string(),
                                action: err.suggested_action().map(String::from),
                            });
                            orchestrator.record_load_failure(family, &err);
                        }
                    }
                }
            }
        }

        if configured > 0 && loaded == 0 {
            *self.is_running.write() = false;
            return Err(Error::Model(
                "No backend could be loaded; perception modes are unusable".to_string(),
            ));
        }
        *self.circuit_states.write() = orchestrator.circuit_states();

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        *self.command_tx.write() = Some(command_tx);

        let handle = tokio::spawn(Self::processing_loop(
            orchestrator,
            self.slot.clone(),
            command_rx,
            self.events.clone(),
            self.alerts.clone(),
            self.circuit_states.clone(),
        ));
        *self.processing_handle.lock() = Some(handle);

        self.alerts.start(self.events.clone());

        info!("Perception pipeline started ({}/{} backends)", loaded, configured);
        Ok(())
    }

    /// The processing task: reacts to frames from the handoff slot and
    /// commands from the UI, one at a time.
    async fn processing_loop(
        mut orchestrator: ModeOrchestrator,
        slot: Arc<FrameSlot>,
        mut command_rx: mpsc::Receiver<PipelineCommand>,
        events: broadcast::Sender<PipelineEvent>,
        alerts: Arc<AlertQueue>,
        circuit_states: Arc<RwLock<HashMap<String, String>>>,
    ) {
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(PipelineCommand::SetMode { mode, reply }) => {
                            let from = orchestrator.mode();
                            let result = orchestrator.request_mode(mode);
                            if let Ok(to) = &result {
                                if *to != from {
                                    let _ = events.send(PipelineEvent::ModeChanged { from, to: *to });
                                }
                            }
                            let _ = reply.send(result);
                        }
                        None => break,
                    }
                }
                frame = slot.take() => {
                    match frame {
                        Some(frame) => {
                            match orchestrator.process_frame(frame).await {
                                Ok(outcomes) => {
                                    Self::publish_outcomes(outcomes, &events, &alerts);
                                }
                                Err(err) => {
                                    error!("Pipeline fault: {}", err);
                                    let _ = events.send(PipelineEvent::Fault {
                                        message: err.to_string(),
                                        action: err.suggested_action().map(String::from),
                                    });
                                }
                            }
                            *circuit_states.write() = orchestrator.circuit_states();
                        }
                        None => break,
                    }
                }
            }
        }
        info!("Processing task stopped");
    }

    fn publish_outcomes(
        outcomes: Vec<FrameOutcome>,
        events: &broadcast::Sender<PipelineEvent>,
        alerts: &AlertQueue,
    ) {
        for outcome in outcomes {
            match outcome {
                FrameOutcome::Prediction(prediction) => {
                    alerts.offer_prediction(&prediction);
                    let _ = events.send(PipelineEvent::Prediction(prediction));
                }
                FrameOutcome::Detections {
                    detections,
                    degraded,
                } => {
                    alerts.offer(&detections);
                    let _ = events.send(PipelineEvent::Detections {
                        detections,
                        degraded,
                    });
                }
                FrameOutcome::Degraded {
                    requested,
                    fallback,
                } => {
                    let _ = events.send(PipelineEvent::BackendDegraded {
                        requested,
                        fallback,
                    });
                }
                FrameOutcome::Unavailable { family, cause } => {
                    let _ = events.send(PipelineEvent::Fault {
                        message: format!("{} backend unavailable: {}", family, cause),
                        action: Some("open settings".to_string()),
                    });
                }
            }
        }
    }

    /// Accept one camera frame. Never blocks; a pending frame is replaced
    /// and counted as dropped. Returns whether the frame was accepted.
    pub fn push_frame(&self, frame: Frame) -> bool {
        if !*self.is_running.read() {
            return false;
        }
        self.metrics.record_frame_received();
        if self.slot.offer(frame) {
            self.metrics.record_frame_dropped();
        }
        true
    }

    /// Request a mode switch. Dwell-interval rejections come back as
    /// `ModeSwitchRejected` with the remaining time.
    pub async fn set_mode(&self, mode: OperatingMode) -> Result<OperatingMode, PerceptError> {
        let sender = self
            .command_tx
            .read()
            .clone()
            .ok_or_else(|| PerceptError::Config("Pipeline not started".to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(PipelineCommand::SetMode {
                mode,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PerceptError::Config("Pipeline shutting down".to_string()))?;

        reply_rx
            .await
            .map_err(|_| PerceptError::Config("Pipeline shutting down".to_string()))?
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Merged health snapshot across the perception and alert layers.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.duplicates_filtered = self.alerts.duplicates_filtered();
        snapshot.circuit_states = self.circuit_states.read().clone();
        snapshot
    }

    pub fn is_running(&self) -> bool {
        *self.is_running.read()
    }

    /// Stop the pipeline: close the handoff, end the processing task, and
    /// cancel the alert drain. Idempotent.
    pub async fn stop(&self) -> Result<(), Error> {
        {
            let mut running = self.is_running.write();
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        self.slot.close();
        *self.command_tx.write() = None;

        let handle = self.processing_handle.lock().take();
        if let Some(mut handle) = handle {
            match tokio::time::timeout(Duration::from_secs(1), &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("Processing task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        self.alerts.stop();
        info!("Perception pipeline stopped");
        Ok(())
    }
}
