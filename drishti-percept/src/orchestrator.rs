//! Mode orchestrator: the scheduling core
//!
//! Owns the active operating mode and every per-backend policy: debounced
//! mode switching, the at-most-one-in-flight rule, adaptive frame pacing,
//! retry with jittered backoff, circuit breaking, and fallback routing.
//! All mutable scheduling state (breakers, in-flight flags, smoothing
//! windows) is owned here and mutated by no one else.

use crate::backends::{
    classifier, detector, sequence, BackendAdapter, RawOutput, SequenceAccumulator,
};
use crate::circuit::{CircuitBreaker, CircuitState};
use crate::config::PerceptConfig;
use crate::device::DeviceStatus;
use crate::error::PerceptError;
use crate::metrics::MetricsAggregator;
use crate::preprocess::FramePreprocessor;
use crate::smoothing::{DetectionStabilizer, SmoothingBuffer};
use crate::tensor::Tensor;
use drishti_core::{Detection, Frame, ModelFamily, OperatingMode, SmoothedPrediction};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Smoothing window for sequence-model outputs; the temporal model is
/// already stabilized by its input window, so this only guards against a
/// single spurious decode.
const SEQUENCE_SMOOTHING_WINDOW: usize = 3;
const SEQUENCE_SMOOTHING_QUORUM: f32 = 0.5;

/// Retry jitter bound in milliseconds.
const RETRY_JITTER_MS: u64 = 50;

/// What one processing cycle produced.
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    Prediction(SmoothedPrediction),
    Detections {
        detections: Vec<Detection>,
        degraded: bool,
    },
    /// A secondary backend is covering for an unavailable primary.
    Degraded {
        requested: ModelFamily,
        fallback: ModelFamily,
    },
    /// No backend (primary or secondary) can serve this mode.
    Unavailable {
        family: ModelFamily,
        cause: String,
    },
}

struct BackendSlot {
    adapter: Option<Arc<BackendAdapter>>,
    breaker: CircuitBreaker,
    in_flight: bool,
    load_error: Option<String>,
}

pub struct ModeOrchestrator {
    config: Arc<PerceptConfig>,
    device: Arc<dyn DeviceStatus>,
    metrics: Arc<MetricsAggregator>,

    mode: OperatingMode,
    mode_changed_at: Option<Instant>,
    mode_epoch: u64,

    backends: HashMap<ModelFamily, BackendSlot>,

    preprocessor: FramePreprocessor,
    classifier_buffer: SmoothingBuffer,
    sequence_buffer: SmoothingBuffer,
    detection_stabilizer: DetectionStabilizer,
    sequence_window: SequenceAccumulator,

    last_accepted: Option<Instant>,
    reported_unavailable: HashSet<ModelFamily>,
    degraded_reported: bool,
}

impl ModeOrchestrator {
    pub fn new(
        config: Arc<PerceptConfig>,
        device: Arc<dyn DeviceStatus>,
        metrics: Arc<MetricsAggregator>,
    ) -> Result<Self, PerceptError> {
        config.validate().map_err(PerceptError::Config)?;

        Ok(Self {
            preprocessor: FramePreprocessor::new(config.corrupted_streak_limit),
            classifier_buffer: SmoothingBuffer::new(
                ModelFamily::Classifier,
                config.smoothing_window_min,
                config.smoothing_window_max,
                config.quorum,
            ),
            sequence_buffer: SmoothingBuffer::fixed(
                ModelFamily::Sequence,
                SEQUENCE_SMOOTHING_WINDOW,
                SEQUENCE_SMOOTHING_QUORUM,
            ),
            detection_stabilizer: DetectionStabilizer::new(
                config.smoothing_window_min,
                config.quorum,
            ),
            sequence_window: SequenceAccumulator::new(config.sequence_length),
            config,
            device,
            metrics,
            mode: OperatingMode::Idle,
            mode_changed_at: None,
            mode_epoch: 0,
            backends: HashMap::new(),
            last_accepted: None,
            reported_unavailable: HashSet::new(),
            degraded_reported: false,
        })
    }

    /// Register a loaded backend.
    pub fn install_backend(&mut self, adapter: BackendAdapter) {
        let family = adapter.family();
        self.backends.insert(
            family,
            BackendSlot {
                adapter: Some(Arc::new(adapter)),
                breaker: CircuitBreaker::new(
                    family.to_string(),
                    self.config.breaker_failure_threshold,
                    self.config.breaker_cooldown(),
                ),
                in_flight: false,
                load_error: None,
            },
        );
    }

    /// Record a backend whose model failed to load; routing treats it as
    /// unavailable and falls back where a secondary exists.
    pub fn record_load_failure(&mut self, family: ModelFamily, error: &PerceptError) {
        warn!("Backend {} unavailable: {}", family, error);
        self.backends.insert(
            family,
            BackendSlot {
                adapter: None,
                breaker: CircuitBreaker::new(
                    family.to_string(),
                    self.config.breaker_failure_threshold,
                    self.config.breaker_cooldown(),
                ),
                in_flight: false,
                load_error: Some(error.to_string()),
            },
        );
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn mode_epoch(&self) -> u64 {
        self.mode_epoch
    }

    pub fn has_backend(&self, family: ModelFamily) -> bool {
        self.backends
            .get(&family)
            .map(|s| s.adapter.is_some())
            .unwrap_or(false)
    }

    /// Breaker state per registered backend, for the metrics snapshot.
    pub fn circuit_states(&self) -> HashMap<String, String> {
        self.backends
            .iter()
            .map(|(family, slot)| (family.to_string(), slot.breaker.state().to_string()))
            .collect()
    }

    /// Request a mode transition.
    ///
    /// A request arriving before the dwell interval has elapsed since the
    /// last honored transition is rejected with the remaining time, so a
    /// double-tap cannot leave the pipeline half-switched. Re-requesting
    /// the current mode outside the dwell window is a no-op.
    pub fn request_mode(&mut self, mode: OperatingMode) -> Result<OperatingMode, PerceptError> {
        if let Some(changed_at) = self.mode_changed_at {
            let elapsed = changed_at.elapsed();
            let dwell = self.config.mode_dwell();
            if elapsed < dwell {
                let remaining_ms = (dwell - elapsed).as_millis() as u64;
                debug!(
                    "Mode switch to {} rejected, {}ms of dwell remain",
                    mode, remaining_ms
                );
                return Err(PerceptError::ModeSwitchRejected {
                    requested: mode,
                    remaining_ms: remaining_ms.max(1),
                });
            }
        }

        if mode == self.mode {
            return Ok(self.mode);
        }

        let previous = self.mode;
        self.mode = mode;
        self.mode_changed_at = Some(Instant::now());
        self.mode_epoch = self.mode_epoch.wrapping_add(1);
        self.clear_interest();
        info!("Mode changed: {} -> {}", previous, mode);
        Ok(mode)
    }

    /// Drop interest in results belonging to the previous mode. In-flight
    /// inference is not aborted; its result is discarded by the epoch
    /// check when it completes.
    fn clear_interest(&mut self) {
        self.classifier_buffer.clear();
        self.sequence_buffer.clear();
        self.detection_stabilizer.clear();
        self.sequence_window.clear();
        self.reported_unavailable.clear();
        self.degraded_reported = false;
    }

    /// Desired inter-frame interval from profile, battery tier, and
    /// foreground state. Lower battery monotonically stretches the
    /// interval; background is a flat multiplier.
    pub fn target_interval(&self) -> Duration {
        let base = self.config.fps_profile.base_interval();
        let battery = self.device.battery_percent();
        let battery_multiplier: u32 = if battery < 8 {
            4
        } else if battery < 20 {
            2
        } else {
            1
        };
        let foreground_multiplier: u32 = if self.device.is_foreground() { 1 } else { 4 };
        base * battery_multiplier * foreground_multiplier
    }

    /// Process one camera frame under the current mode.
    ///
    /// Frames arriving faster than the target interval are dropped, not
    /// queued. Only a persistent camera fault propagates as an error;
    /// backend failures are absorbed into outcomes and counters.
    pub async fn process_frame(&mut self, frame: Frame) -> Result<Vec<FrameOutcome>, PerceptError> {
        if !self.mode.uses_camera() {
            return Ok(Vec::new());
        }

        if let Some(last) = self.last_accepted {
            if last.elapsed() < self.target_interval() {
                self.metrics.record_frame_dropped();
                return Ok(Vec::new());
            }
        }
        self.last_accepted = Some(Instant::now());

        let epoch = self.mode_epoch;
        let outcomes = match self.mode {
            OperatingMode::SignTranslation => self.process_sign_frame(frame, epoch).await?,
            OperatingMode::ObjectDetection => self.process_detection_frame(frame, epoch).await?,
            _ => Vec::new(),
        };

        Ok(outcomes)
    }

    async fn process_sign_frame(
        &mut self,
        frame: Frame,
        epoch: u64,
    ) -> Result<Vec<FrameOutcome>, PerceptError> {
        let mut outcomes = Vec::new();

        let Some(adapter) = self.available_adapter(ModelFamily::Classifier) else {
            if let Some(outcome) = self.report_unavailable(ModelFamily::Classifier) {
                outcomes.push(outcome);
            }
            return Ok(outcomes);
        };

        if self.is_busy(ModelFamily::Classifier) {
            self.metrics.record_frame_dropped();
            return Ok(outcomes);
        }

        let Some(tensor) = self.prepare_tensor(&frame, &adapter)? else {
            return Ok(outcomes);
        };

        let raw = match self.run_inference(ModelFamily::Classifier, tensor).await {
            Ok(raw) => raw,
            Err(err) => {
                self.absorb_backend_error(ModelFamily::Classifier, err, &mut outcomes);
                return Ok(outcomes);
            }
        };

        if epoch != self.mode_epoch {
            debug!("Discarding classifier result from stale epoch");
            return Ok(outcomes);
        }
        self.metrics.record_frame_processed();

        // Feed the temporal window regardless of classification outcome;
        // low-confidence frames still carry useful features.
        if let Some(features) = raw.features.clone() {
            self.sequence_window.push(features);
        }

        let sequence_degraded = self.sequence_fallback_active(&mut outcomes);

        match classifier::decode(
            &raw,
            self.config.confidence_threshold(ModelFamily::Classifier),
            frame.timestamp,
        ) {
            Ok(Some(result)) => {
                if let Some(mut prediction) = self.classifier_buffer.push(result) {
                    prediction.degraded = sequence_degraded;
                    outcomes.push(FrameOutcome::Prediction(prediction));
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!("Classifier decode failed: {}", err);
                self.metrics.record_inference_error();
            }
        }

        if !sequence_degraded {
            self.run_sequence_step(frame.timestamp, epoch, &mut outcomes)
                .await;
        }

        Ok(outcomes)
    }

    /// Run the temporal model once its feature window is full.
    async fn run_sequence_step(
        &mut self,
        frame_timestamp: chrono::DateTime<chrono::Utc>,
        epoch: u64,
        outcomes: &mut Vec<FrameOutcome>,
    ) {
        if !self.sequence_window.is_ready() || self.is_busy(ModelFamily::Sequence) {
            return;
        }
        let Some(tensor) = self.sequence_window.tensor() else {
            return;
        };

        let raw = match self.run_inference(ModelFamily::Sequence, tensor).await {
            Ok(raw) => raw,
            Err(err) => {
                self.absorb_backend_error(ModelFamily::Sequence, err, outcomes);
                self.sequence_window.slide();
                return;
            }
        };
        self.sequence_window.slide();

        if epoch != self.mode_epoch {
            debug!("Discarding sequence result from stale epoch");
            return;
        }

        match sequence::decode(
            &raw,
            self.config.confidence_threshold(ModelFamily::Sequence),
            frame_timestamp,
        ) {
            Ok(Some(result)) => {
                if let Some(prediction) = self.sequence_buffer.push(result) {
                    outcomes.push(FrameOutcome::Prediction(prediction));
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!("Sequence decode failed: {}", err);
                self.metrics.record_inference_error();
            }
        }
    }

    async fn process_detection_frame(
        &mut self,
        frame: Frame,
        epoch: u64,
    ) -> Result<Vec<FrameOutcome>, PerceptError> {
        let mut outcomes = Vec::new();

        let Some(adapter) = self.available_adapter(ModelFamily::Detector) else {
            // No secondary covers detection; the exhausted chain is
            // surfaced instead of silently idling.
            if let Some(outcome) = self.report_unavailable(ModelFamily::Detector) {
                outcomes.push(outcome);
            }
            return Ok(outcomes);
        };

        if self.is_busy(ModelFamily::Detector) {
            self.metrics.record_frame_dropped();
            return Ok(outcomes);
        }

        let Some(tensor) = self.prepare_tensor(&frame, &adapter)? else {
            return Ok(outcomes);
        };

        let raw = match self.run_inference(ModelFamily::Detector, tensor).await {
            Ok(raw) => raw,
            Err(err) => {
                self.absorb_backend_error(ModelFamily::Detector, err, &mut outcomes);
                return Ok(outcomes);
            }
        };

        if epoch != self.mode_epoch {
            debug!("Discarding detector result from stale epoch");
            return Ok(outcomes);
        }
        self.metrics.record_frame_processed();

        let decoded = detector::decode(
            &raw,
            self.config.confidence_threshold(ModelFamily::Detector),
        );
        let stabilized = self.detection_stabilizer.push(decoded);
        if !stabilized.is_empty() {
            outcomes.push(FrameOutcome::Detections {
                detections: stabilized,
                degraded: false,
            });
        }

        Ok(outcomes)
    }

    /// Validate and convert a frame, folding corruption into metrics.
    fn prepare_tensor(
        &mut self,
        frame: &Frame,
        adapter: &Arc<BackendAdapter>,
    ) -> Result<Option<Tensor>, PerceptError> {
        match self.preprocessor.prepare(frame, &adapter.input_shape()) {
            Ok(Some(tensor)) => Ok(Some(tensor)),
            Ok(None) => {
                self.metrics.record_frame_corrupted();
                Ok(None)
            }
            Err(err) => {
                self.metrics.record_frame_corrupted();
                Err(err)
            }
        }
    }

    /// A backend with a loaded model. Breaker admission (including the
    /// open-to-half-open transition) is decided by `run_inference`.
    fn available_adapter(&self, family: ModelFamily) -> Option<Arc<BackendAdapter>> {
        self.backends.get(&family)?.adapter.clone()
    }

    fn is_busy(&self, family: ModelFamily) -> bool {
        self.backends
            .get(&family)
            .map(|s| s.in_flight)
            .unwrap_or(false)
    }

    /// When the sequence backend cannot serve, the classifier covers
    /// static signs and results are marked degraded.
    fn sequence_fallback_active(&mut self, outcomes: &mut Vec<FrameOutcome>) -> bool {
        let unavailable = match self.backends.get(&ModelFamily::Sequence) {
            None => true,
            Some(slot) => slot.adapter.is_none() || slot.breaker.state() == CircuitState::Open,
        };
        if unavailable && !self.degraded_reported {
            self.degraded_reported = true;
            outcomes.push(FrameOutcome::Degraded {
                requested: ModelFamily::Sequence,
                fallback: ModelFamily::Classifier,
            });
        }
        unavailable
    }

    /// Report an unavailable backend once per mode activation.
    fn report_unavailable(&mut self, family: ModelFamily) -> Option<FrameOutcome> {
        if self.reported_unavailable.contains(&family) {
            return None;
        }
        self.reported_unavailable.insert(family);
        let cause = self
            .backends
            .get(&family)
            .map(|slot| {
                slot.load_error
                    .clone()
                    .unwrap_or_else(|| format!("circuit {}", slot.breaker.state()))
            })
            .unwrap_or_else(|| "not configured".to_string());
        Some(FrameOutcome::Unavailable { family, cause })
    }

    /// Fold a backend failure into counters and one-shot outcomes.
    fn absorb_backend_error(
        &mut self,
        family: ModelFamily,
        err: PerceptError,
        outcomes: &mut Vec<FrameOutcome>,
    ) {
        match &err {
            PerceptError::CircuitOpen { .. } | PerceptError::BackendUnavailable(_) => {
                if let Some(outcome) = self.report_unavailable(family) {
                    outcomes.push(outcome);
                }
            }
            _ => {
                warn!("Inference on {} failed: {}", family, err);
            }
        }
    }

    /// One inference call under the full policy: breaker admission, retry
    /// with jittered exponential backoff, per-call timeout, and breaker
    /// bookkeeping on the surfaced outcome.
    async fn run_inference(
        &mut self,
        family: ModelFamily,
        input: Tensor,
    ) -> Result<RawOutput, PerceptError> {
        let adapter = {
            let slot = self
                .backends
                .get_mut(&family)
                .ok_or(PerceptError::BackendUnavailable(family))?;
            let adapter = slot
                .adapter
                .clone()
                .ok_or(PerceptError::BackendUnavailable(family))?;
            if slot.in_flight {
                return Err(PerceptError::Inference {
                    detail: format!("{} already has an inference in flight", family),
                    retryable: false,
                });
            }
            if let Err(remaining) = slot.breaker.try_acquire() {
                return Err(PerceptError::CircuitOpen {
                    backend: family,
                    cooldown_secs: remaining.as_secs().max(1),
                });
            }
            slot.in_flight = true;
            adapter
        };

        let result = self.run_attempts(&adapter, input).await;

        if let Some(slot) = self.backends.get_mut(&family) {
            slot.in_flight = false;
            match &result {
                Ok(_) => slot.breaker.on_success(),
                Err(_) => slot.breaker.on_failure(),
            }
        }

        result
    }

    /// The retry loop around a single adapter call.
    async fn run_attempts(
        &self,
        adapter: &Arc<BackendAdapter>,
        input: Tensor,
    ) -> Result<RawOutput, PerceptError> {
        let timeout = self.config.inference_timeout();
        let mut delay = self.config.retry_initial_delay_ms;
        let mut attempt: u32 = 0;

        loop {
            let started = Instant::now();
            match adapter.infer(input.clone(), timeout).await {
                Ok(output) => {
                    self.metrics.record_inference(started.elapsed());
                    return Ok(output);
                }
                Err(err) => {
                    self.metrics.record_inference_error();
                    if err.is_retryable() && attempt < self.config.max_retries {
                        attempt += 1;
                        self.metrics.record_retry();
                        let jitter = rand::thread_rng().gen_range(0..=RETRY_JITTER_MS);
                        debug!(
                            "Retrying {} in {}ms (attempt {}/{})",
                            adapter.family(),
                            delay + jitter,
                            attempt,
                            self.config.max_retries
                        );
                        tokio::time::sleep(Duration::from_millis(delay + jitter)).await;
                        delay = delay
                            .checked_mul(2)
                            .map(|d| d.min(self.config.retry_max_delay_ms))
                            .unwrap_or(self.config.retry_max_delay_ms);
                    } else {
                        return Err(err);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{EngineFault, InferenceEngine, RawDetection};
    use crate::config::FpsProfile;
    use crate::device::StaticDeviceStatus;
    use crate::tensor::TensorShape;
    use bytes::Bytes;
    use parking_lot::Mutex;

    /// Engine with a scripted outcome sequence; repeats the last entry.
    struct ScriptedEngine {
        script: Mutex<Vec<Result<RawOutput, EngineFault>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedEngine {
        fn new(script: Vec<Result<RawOutput, EngineFault>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }

        fn always(outcome: Result<RawOutput, EngineFault>) -> Self {
            Self::new(vec![outcome])
        }
    }

    impl InferenceEngine for ScriptedEngine {
        fn infer(&self, _input: &Tensor) -> Result<RawOutput, EngineFault> {
            *self.calls.lock() += 1;
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }

        fn input_shape(&self) -> TensorShape {
            TensorShape::image(8, 8, 3)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn classifier_output(class_id: usize, confidence: f32) -> RawOutput {
        let mut scores = vec![0.005; classifier::SIGN_LABELS.len()];
        scores[class_id] = confidence;
        RawOutput {
            scores,
            features: Some(vec![0.1; 16]),
            boxes: vec![],
        }
    }

    fn detector_output(class_id: usize, confidence: f32) -> RawOutput {
        RawOutput {
            boxes: vec![RawDetection {
                class_id,
                score: confidence,
                x: 0.4,
                y: 0.3,
                width: 0.2,
                height: 0.4,
            }],
            ..Default::default()
        }
    }

    fn valid_frame() -> Frame {
        let mut data = vec![0u8; 8 * 8 * 3];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 200) as u8 + 10;
        }
        Frame::new(8, 8, vec![Bytes::from(data)])
    }

    fn test_config() -> PerceptConfig {
        PerceptConfig {
            retry_initial_delay_ms: 1,
            retry_max_delay_ms: 4,
            inference_timeout_ms: 500,
            breaker_cooldown_secs: 1,
            mode_dwell_ms: 50,
            ..Default::default()
        }
    }

    fn orchestrator_with(
        config: PerceptConfig,
        device: Arc<StaticDeviceStatus>,
    ) -> ModeOrchestrator {
        ModeOrchestrator::new(
            Arc::new(config),
            device,
            Arc::new(MetricsAggregator::new()),
        )
        .unwrap()
    }

    fn install(
        orchestrator: &mut ModeOrchestrator,
        family: ModelFamily,
        engine: ScriptedEngine,
    ) {
        orchestrator.install_backend(BackendAdapter::from_engine(family, Arc::new(engine)));
    }

    #[tokio::test]
    async fn test_dwell_rejects_rapid_switch() {
        let mut orch = orchestrator_with(test_config(), Arc::new(StaticDeviceStatus::default()));

        assert_eq!(
            orch.request_mode(OperatingMode::ObjectDetection).unwrap(),
            OperatingMode::ObjectDetection
        );

        // Second request inside the dwell interval is rejected, not ignored
        let err = orch.request_mode(OperatingMode::SignTranslation).unwrap_err();
        match err {
            PerceptError::ModeSwitchRejected { remaining_ms, .. } => assert!(remaining_ms > 0),
            other => panic!("Expected ModeSwitchRejected, got {:?}", other),
        }
        assert_eq!(orch.mode(), OperatingMode::ObjectDetection);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(orch.request_mode(OperatingMode::SignTranslation).is_ok());
    }

    #[tokio::test]
    async fn test_mode_switch_bumps_epoch_and_clears_buffers() {
        let mut orch = orchestrator_with(test_config(), Arc::new(StaticDeviceStatus::default()));
        let epoch = orch.mode_epoch();
        orch.request_mode(OperatingMode::SignTranslation).unwrap();
        assert_eq!(orch.mode_epoch(), epoch + 1);
        assert!(orch.classifier_buffer.is_empty());
        assert!(orch.sequence_window.is_empty());
    }

    #[tokio::test]
    async fn test_target_interval_scales_with_battery_and_background() {
        let device = Arc::new(StaticDeviceStatus::new(100, true));
        let mut config = test_config();
        config.fps_profile = FpsProfile::Balanced;
        let orch = orchestrator_with(config, device.clone());

        assert_eq!(orch.target_interval(), Duration::from_millis(200));

        device.set_battery_percent(15); // saver tier
        assert_eq!(orch.target_interval(), Duration::from_millis(400));

        device.set_battery_percent(5); // critical tier
        assert_eq!(orch.target_interval(), Duration::from_millis(800));

        device.set_foreground(false);
        assert_eq!(orch.target_interval(), Duration::from_millis(3200));
    }

    #[tokio::test]
    async fn test_idle_mode_routes_nothing() {
        let mut orch = orchestrator_with(test_config(), Arc::new(StaticDeviceStatus::default()));
        let outcomes = orch.process_frame(valid_frame()).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_failure() {
        let mut config = test_config();
        config.mode_dwell_ms = 0;
        let mut orch = orchestrator_with(config, Arc::new(StaticDeviceStatus::default()));

        let engine = ScriptedEngine::new(vec![
            Err(EngineFault::Transient("hiccup".to_string())),
            Ok(detector_output(2, 0.9)),
        ]);
        install(&mut orch, ModelFamily::Detector, engine);
        orch.request_mode(OperatingMode::ObjectDetection).unwrap();

        // First frame: transient failure retried to success internally
        let outcomes = orch.process_frame(valid_frame()).await.unwrap();
        assert!(outcomes.is_empty()); // stabilizer needs a second sighting

        tokio::time::sleep(Duration::from_millis(250)).await;
        let outcomes = orch.process_frame(valid_frame()).await.unwrap();
        assert!(matches!(
            outcomes.as_slice(),
            [FrameOutcome::Detections { .. }]
        ));
    }

    #[tokio::test]
    async fn test_breaker_opens_and_reports_unavailable_once() {
        let mut config = test_config();
        config.mode_dwell_ms = 0;
        config.max_retries = 0;
        config.breaker_failure_threshold = 2;
        let mut orch = orchestrator_with(config, Arc::new(StaticDeviceStatus::default()));

        install(
            &mut orch,
            ModelFamily::Detector,
            ScriptedEngine::always(Err(EngineFault::Fatal("broken model".to_string()))),
        );
        orch.request_mode(OperatingMode::ObjectDetection).unwrap();

        for _ in 0..2 {
            tokio::time::sleep(Duration::from_millis(250)).await;
            let _ = orch.process_frame(valid_frame()).await.unwrap();
        }
        assert_eq!(
            orch.circuit_states().get("detector").map(String::as_str),
            Some("open")
        );

        // Breaker open: reported once, then quiet
        tokio::time::sleep(Duration::from_millis(250)).await;
        let outcomes = orch.process_frame(valid_frame()).await.unwrap();
        assert!(matches!(
            outcomes.as_slice(),
            [FrameOutcome::Unavailable { .. }]
        ));

        tokio::time::sleep(Duration::from_millis(250)).await;
        let outcomes = orch.process_frame(valid_frame()).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_sequence_fallback_marks_degraded() {
        let mut config = test_config();
        config.mode_dwell_ms = 0;
        config.smoothing_window_min = 2;
        config.smoothing_window_max = 2;
        let mut orch = orchestrator_with(config, Arc::new(StaticDeviceStatus::default()));

        install(
            &mut orch,
            ModelFamily::Classifier,
            ScriptedEngine::always(Ok(classifier_output(0, 0.95))),
        );
        orch.record_load_failure(
            ModelFamily::Sequence,
            &PerceptError::LoadFileMissing {
                path: std::path::PathBuf::from("sign_lstm.tflite"),
            },
        );
        orch.request_mode(OperatingMode::SignTranslation).unwrap();

        let outcomes = orch.process_frame(valid_frame()).await.unwrap();
        assert!(matches!(
            outcomes.first(),
            Some(FrameOutcome::Degraded {
                requested: ModelFamily::Sequence,
                fallback: ModelFamily::Classifier,
            })
        ));

        tokio::time::sleep(Duration::from_millis(250)).await;
        let outcomes = orch.process_frame(valid_frame()).await.unwrap();
        let prediction = outcomes.iter().find_map(|o| match o {
            FrameOutcome::Prediction(p) => Some(p),
            _ => None,
        });
        let prediction = prediction.expect("classifier prediction after window fills");
        assert!(prediction.degraded);
        assert_eq!(prediction.label, "hello");
    }

    #[tokio::test]
    async fn test_missing_classifier_reports_unavailable() {
        let mut config = test_config();
        config.mode_dwell_ms = 0;
        let mut orch = orchestrator_with(config, Arc::new(StaticDeviceStatus::default()));
        orch.request_mode(OperatingMode::SignTranslation).unwrap();

        let outcomes = orch.process_frame(valid_frame()).await.unwrap();
        assert!(matches!(
            outcomes.as_slice(),
            [FrameOutcome::Unavailable {
                family: ModelFamily::Classifier,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_rate_gate_drops_fast_frames() {
        let mut config = test_config();
        config.mode_dwell_ms = 0;
        config.fps_profile = FpsProfile::BatterySaver;
        let metrics = Arc::new(MetricsAggregator::new());
        let mut orch = ModeOrchestrator::new(
            Arc::new(config),
            Arc::new(StaticDeviceStatus::default()),
            metrics.clone(),
        )
        .unwrap();
        install(
            &mut orch,
            ModelFamily::Detector,
            ScriptedEngine::always(Ok(detector_output(0, 0.9))),
        );
        orch.request_mode(OperatingMode::ObjectDetection).unwrap();

        let _ = orch.process_frame(valid_frame()).await.unwrap();
        // Immediately following frame lands inside the 500ms interval
        let _ = orch.process_frame(valid_frame()).await.unwrap();
        assert_eq!(metrics.frames_dropped(), 1);
    }

    #[tokio::test]
    async fn test_camera_fault_propagates() {
        let mut config = test_config();
        config.mode_dwell_ms = 0;
        config.corrupted_streak_limit = 3;
        config.fps_profile = FpsProfile::High;
        let mut orch = orchestrator_with(config, Arc::new(StaticDeviceStatus::default()));
        install(
            &mut orch,
            ModelFamily::Detector,
            ScriptedEngine::always(Ok(detector_output(0, 0.9))),
        );
        orch.request_mode(OperatingMode::ObjectDetection).unwrap();

        let bad = Frame::new(0, 8, vec![Bytes::from(vec![1u8; 8])]);
        let mut fault = None;
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(120)).await;
            match orch.process_frame(bad.clone()).await {
                Ok(_) => {}
                Err(err) => {
                    fault = Some(err);
                    break;
                }
            }
        }
        match fault {
            Some(PerceptError::CameraFeedCorrupted { consecutive }) => {
                assert_eq!(consecutive, 3)
            }
            other => panic!("Expected CameraFeedCorrupted, got {:?}", other),
        }
    }
}
