//! Temporal sequence model: feature accumulation and decoding
//!
//! The sequence model consumes a fixed-length window of per-frame feature
//! embeddings produced by the classifier. The accumulator owns that
//! window: it fills to the sequence length, emits one input tensor, then
//! slides by one so consecutive inferences overlap.

use crate::backends::RawOutput;
use crate::error::PerceptError;
use crate::tensor::{Tensor, TensorShape};
use chrono::{DateTime, Utc};
use drishti_core::{InferenceResult, ModelFamily};
use std::collections::VecDeque;
use tracing::warn;

/// Sliding window of frame feature vectors feeding the sequence model.
pub struct SequenceAccumulator {
    window: VecDeque<Vec<f32>>,
    sequence_length: usize,
    feature_dims: Option<usize>,
}

impl SequenceAccumulator {
    pub fn new(sequence_length: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(sequence_length),
            sequence_length,
            feature_dims: None,
        }
    }

    /// Push one frame's feature vector.
    ///
    /// The first push fixes the expected dimensionality; a later mismatch
    /// indicates a model change mid-stream, so the window is dropped and
    /// restarted rather than fed mixed shapes.
    pub fn push(&mut self, features: Vec<f32>) {
        if features.is_empty() {
            return;
        }
        match self.feature_dims {
            None => self.feature_dims = Some(features.len()),
            Some(dims) if dims != features.len() => {
                warn!(
                    "Feature dimensionality changed ({} -> {}), restarting sequence window",
                    dims,
                    features.len()
                );
                self.window.clear();
                self.feature_dims = Some(features.len());
            }
            Some(_) => {}
        }

        self.window.push_back(features);
        while self.window.len() > self.sequence_length {
            self.window.pop_front();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.window.len() >= self.sequence_length
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Build the `[1, sequence_length, dims]` input tensor once full.
    pub fn tensor(&self) -> Option<Tensor> {
        if !self.is_ready() {
            return None;
        }
        let dims = self.feature_dims?;
        let mut data = Vec::with_capacity(self.sequence_length * dims);
        for features in self.window.iter().take(self.sequence_length) {
            data.extend_from_slice(features);
        }
        Tensor::new(
            TensorShape::new(vec![1, self.sequence_length, dims]),
            data,
        )
        .ok()
    }

    /// Slide the window forward after an inference was taken from it.
    pub fn slide(&mut self) {
        self.window.pop_front();
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

/// Decode raw sequence-model scores into a temporal sign result.
pub fn decode(
    raw: &RawOutput,
    threshold: f32,
    frame_timestamp: DateTime<Utc>,
) -> Result<Option<InferenceResult>, PerceptError> {
    super::classifier::decode_scores(raw, ModelFamily::Sequence, threshold, frame_timestamp)
}
