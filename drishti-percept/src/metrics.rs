//! Rolling health counters for the pipeline
//!
//! Observed by every stage, exposed to external callers as a pull-based
//! snapshot. Counters use atomics; the latency and frame-time windows sit
//! behind short-lived locks never held across an await point.

use drishti_core::MetricsSnapshot;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Samples kept in the rolling latency and frame-time windows.
const WINDOW_LEN: usize = 120;

#[derive(Default)]
struct Windows {
    latencies: VecDeque<Duration>,
    frame_times: VecDeque<Instant>,
}

/// Rolling counters shared across the pipeline via `Arc`.
#[derive(Default)]
pub struct MetricsAggregator {
    frames_received: AtomicU64,
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
    frames_corrupted: AtomicU64,
    inference_count: AtomicU64,
    inference_errors: AtomicU64,
    retries: AtomicU64,
    windows: Mutex<Windows>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        let mut windows = self.windows.lock();
        windows.frame_times.push_back(Instant::now());
        while windows.frame_times.len() > WINDOW_LEN {
            windows.frame_times.pop_front();
        }
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_corrupted(&self) {
        self.frames_corrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference(&self, latency: Duration) {
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        let mut windows = self.windows.lock();
        windows.latencies.push_back(latency);
        while windows.latencies.len() > WINDOW_LEN {
            windows.latencies.pop_front();
        }
    }

    pub fn record_inference_error(&self) {
        self.inference_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Point-in-time snapshot. Breaker states and alert counters are
    /// merged in by the composition layer.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (average_latency_ms, current_fps) = {
            let windows = self.windows.lock();

            let average_latency_ms = if windows.latencies.is_empty() {
                0.0
            } else {
                let total: Duration = windows.latencies.iter().sum();
                total.as_secs_f64() * 1000.0 / windows.latencies.len() as f64
            };

            let current_fps = match (windows.frame_times.front(), windows.frame_times.back()) {
                (Some(first), Some(last)) if windows.frame_times.len() >= 2 => {
                    let span = last.duration_since(*first).as_secs_f64();
                    if span > 0.0 {
                        (windows.frame_times.len() - 1) as f64 / span
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            };

            (average_latency_ms, current_fps)
        };

        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_corrupted: self.frames_corrupted.load(Ordering::Relaxed),
            inference_count: self.inference_count.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            average_latency_ms,
            current_fps,
            duplicates_filtered: 0,
            circuit_states: Default::default(),
        }
    }
}
