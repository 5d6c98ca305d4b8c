//! Temporal smoothing of inference results
//!
//! Converts frame-level jitter into stable decisions. Each backend family
//! owns its own buffer instance; results from different families never
//! share a window.

use drishti_core::{Detection, InferenceResult, ModelFamily, SmoothedPrediction};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Label-change events tracked for adaptive window sizing.
const CHANGE_HISTORY_LEN: usize = 8;
/// Change rate at or below which the window grows to its maximum.
const STABLE_RATE: f32 = 0.125;
/// Change rate at or above which the window shrinks to its minimum.
const CHURN_RATE: f32 = 0.5;

/// Fixed-capacity sliding window with majority-with-averaging aggregation.
///
/// With distinct min/max bounds the capacity adapts: frequent label
/// disagreement shrinks the window (more responsive), consistent
/// predictions grow it (more stable).
pub struct SmoothingBuffer {
    family: ModelFamily,
    window: VecDeque<InferenceResult>,
    capacity: usize,
    min_capacity: usize,
    max_capacity: usize,
    quorum: f32,
    change_history: VecDeque<bool>,
}

impl SmoothingBuffer {
    pub fn new(family: ModelFamily, min_capacity: usize, max_capacity: usize, quorum: f32) -> Self {
        let min_capacity = min_capacity.max(1);
        let max_capacity = max_capacity.max(min_capacity);
        Self {
            family,
            window: VecDeque::with_capacity(max_capacity),
            capacity: max_capacity,
            min_capacity,
            max_capacity,
            quorum,
            change_history: VecDeque::with_capacity(CHANGE_HISTORY_LEN),
        }
    }

    /// Fixed-size buffer (no adaptation).
    pub fn fixed(family: ModelFamily, capacity: usize, quorum: f32) -> Self {
        Self::new(family, capacity, capacity, quorum)
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Push a result and recompute the aggregate.
    ///
    /// Results from another family are a caller bug and are dropped.
    pub fn push(&mut self, result: InferenceResult) -> Option<SmoothedPrediction> {
        if result.family != self.family {
            debug!(
                "Dropping {} result pushed into {} buffer",
                result.family, self.family
            );
            return None;
        }

        let changed = self
            .window
            .back()
            .map(|last| last.label != result.label)
            .unwrap_or(false);
        self.change_history.push_back(changed);
        while self.change_history.len() > CHANGE_HISTORY_LEN {
            self.change_history.pop_front();
        }
        self.adapt_capacity();

        self.window.push_back(result);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }

        self.aggregate()
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.change_history.clear();
    }

    /// Map recent label variance to a capacity within the bounds.
    fn adapt_capacity(&mut self) {
        if self.min_capacity == self.max_capacity || self.change_history.len() < CHANGE_HISTORY_LEN
        {
            return;
        }

        let changes = self.change_history.iter().filter(|&&c| c).count();
        let rate = changes as f32 / self.change_history.len() as f32;
        let scaled = ((rate - STABLE_RATE) / (CHURN_RATE - STABLE_RATE)).clamp(0.0, 1.0);
        let span = (self.max_capacity - self.min_capacity) as f32;
        let new_capacity = self.max_capacity - (scaled * span).round() as usize;

        if new_capacity != self.capacity {
            debug!(
                "{} smoothing window {} -> {} (change rate {:.2})",
                self.family, self.capacity, new_capacity, rate
            );
            self.capacity = new_capacity;
        }
    }

    /// Majority-with-averaging over the current window.
    fn aggregate(&self) -> Option<SmoothedPrediction> {
        let len = self.window.len();
        if len < self.min_capacity {
            return None;
        }

        let mut tally: HashMap<&str, (usize, f32)> = HashMap::new();
        for entry in &self.window {
            let slot = tally.entry(entry.label.as_str()).or_insert((0, 0.0));
            slot.0 += 1;
            slot.1 += entry.confidence;
        }

        let (label, (support, confidence_sum)) = tally
            .into_iter()
            .max_by(|a, b| {
                a.1 .0
                    .cmp(&b.1 .0)
                    .then(a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
            })?;

        // Quorum over the current window length, not the capacity
        if (support as f32) + 1e-6 < self.quorum * len as f32 {
            return None;
        }

        Some(SmoothedPrediction {
            label: label.to_string(),
            confidence: confidence_sum / support as f32,
            support,
            window_len: len,
            degraded: false,
        })
    }
}

/// Stabilizer for the detector family: a window of per-frame detection
/// lists. A label is emitted once it appears in a quorum of recent
/// frames, with its confidence averaged across those frames (the
/// confidence-averaging policy) and geometry from the newest sighting.
pub struct DetectionStabilizer {
    window: VecDeque<Vec<Detection>>,
    capacity: usize,
    quorum: f32,
}

impl DetectionStabilizer {
    pub fn new(capacity: usize, quorum: f32) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            quorum,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Push one frame's detections, returning the stabilized set.
    pub fn push(&mut self, detections: Vec<Detection>) -> Vec<Detection> {
        self.window.push_back(detections);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }

        let frames = self.window.len();
        // One frame is not evidence of a stable object yet
        if frames < 2 {
            return Vec::new();
        }

        // Per label: frames seen in, confidence sum over best sighting
        // per frame, newest sighting
        let mut tally: HashMap<usize, (usize, f32, &Detection)> = HashMap::new();
        for frame in &self.window {
            let mut best_in_frame: HashMap<usize, &Detection> = HashMap::new();
            for det in frame {
                best_in_frame
                    .entry(det.class_id)
                    .and_modify(|cur| {
                        if det.confidence > cur.confidence {
                            *cur = det;
                        }
                    })
                    .or_insert(det);
            }
            for (class_id, det) in best_in_frame {
                let slot = tally.entry(class_id).or_insert((0, 0.0, det));
                slot.0 += 1;
                slot.1 += det.confidence;
                slot.2 = det; // windows iterate oldest to newest
            }
        }

        let mut stabilized: Vec<Detection> = tally
            .into_values()
            .filter(|(seen, _, _)| (*seen as f32) + 1e-6 >= self.quorum * frames as f32)
            .map(|(seen, confidence_sum, newest)| Detection {
                confidence: confidence_sum / seen as f32,
                ..newest.clone()
            })
            .collect();

        stabilized.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        stabilized
    }
}
