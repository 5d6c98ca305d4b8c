//! Alert priority queue with deduplication and serialized playback
//!
//! `offer` and the drain tick are the only writers; both take the single
//! internal lock for short, await-free sections, so queue and cache
//! mutations never interleave mid-update.

use crate::config::AlertConfig;
use crate::playback::PlaybackSink;
use crate::priority::tier_for_label;
use crate::spatial::{distance_bucket, distance_phrase, zone_for_center};
use chrono::Utc;
use drishti_core::{Alert, AlertTier, Detection, PipelineEvent, SmoothedPrediction, Zone};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct QueuedAlert {
    alert: Alert,
    confidence: f32,
    seq: u64,
}

impl PartialEq for QueuedAlert {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedAlert {}

impl PartialOrd for QueuedAlert {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedAlert {
    /// Max-heap order: tier first, then confidence, then insertion order
    /// (earlier wins) for stability.
    fn cmp(&self, other: &Self) -> Ordering {
        self.alert
            .tier
            .cmp(&other.alert.tier)
            .then(
                self.confidence
                    .partial_cmp(&other.confidence)
                    .unwrap_or(Ordering::Equal),
            )
            .then(other.seq.cmp(&self.seq))
    }
}

struct QueueInner {
    heap: BinaryHeap<QueuedAlert>,
    seq: u64,
    /// Dedup key -> last time an alert with that key was queued.
    recent: HashMap<String, Instant>,
}

/// Priority queue between perception outcomes and the playback channel.
pub struct AlertQueue {
    config: Arc<AlertConfig>,
    sink: Arc<dyn PlaybackSink>,
    inner: Mutex<QueueInner>,
    duplicates_filtered: AtomicU64,
    drain_handle: Mutex<Option<JoinHandle<()>>>,
}

impl AlertQueue {
    pub fn new(
        config: AlertConfig,
        sink: Arc<dyn PlaybackSink>,
    ) -> Result<Self, crate::error::AlertError> {
        config
            .validate()
            .map_err(crate::error::AlertError::Config)?;
        Ok(Self {
            config: Arc::new(config),
            sink,
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::new(),
                seq: 0,
                recent: HashMap::new(),
            }),
            duplicates_filtered: AtomicU64::new(0),
            drain_handle: Mutex::new(None),
        })
    }

    /// Offer one processing cycle's detections.
    ///
    /// At most `max_per_cycle` are admitted; a dedup key seen within the
    /// cooldown is dropped and counted instead of queued, since a static
    /// object would otherwise re-announce every cycle. Returns the number
    /// queued.
    pub fn offer(&self, detections: &[Detection]) -> usize {
        let now = Instant::now();
        let cooldown = self.config.cooldown();
        let mut inner = self.inner.lock();
        inner.recent.retain(|_, seen| now.duration_since(*seen) < cooldown);

        let mut admitted = 0;
        for detection in detections {
            if admitted >= self.config.max_per_cycle {
                debug!(
                    "Admission cap reached, {} detections deferred this cycle",
                    detections.len() - admitted
                );
                break;
            }

            let alert = self.build_alert(detection);
            if let Some(seen) = inner.recent.get(&alert.dedup_key) {
                if now.duration_since(*seen) < cooldown {
                    self.duplicates_filtered
                        .fetch_add(1, AtomicOrdering::Relaxed);
                    debug!("Duplicate alert filtered: {}", alert.dedup_key);
                    continue;
                }
            }

            inner.recent.insert(alert.dedup_key.clone(), now);
            let seq = inner.seq;
            inner.seq += 1;
            inner.heap.push(QueuedAlert {
                alert,
                confidence: detection.confidence,
                seq,
            });
            admitted += 1;
        }

        Self::shed_overflow(&mut inner, self.config.queue_capacity);
        admitted
    }

    /// Offer an accepted sign prediction; spoken through the same
    /// serialized channel as detection alerts.
    pub fn offer_prediction(&self, prediction: &SmoothedPrediction) -> bool {
        let now = Instant::now();
        let cooldown = self.config.cooldown();
        let dedup_key = format!("sign:{}", prediction.label);

        let mut inner = self.inner.lock();
        inner.recent.retain(|_, seen| now.duration_since(*seen) < cooldown);

        if let Some(seen) = inner.recent.get(&dedup_key) {
            if now.duration_since(*seen) < cooldown {
                self.duplicates_filtered
                    .fetch_add(1, AtomicOrdering::Relaxed);
                return false;
            }
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            label: prediction.label.clone(),
            tier: AlertTier::Medium,
            zone: None,
            distance_feet: None,
            message: prediction.label.clone(),
            dedup_key: dedup_key.clone(),
            created_at: Utc::now(),
        };

        inner.recent.insert(dedup_key, now);
        let seq = inner.seq;
        inner.seq += 1;
        inner.heap.push(QueuedAlert {
            alert,
            confidence: prediction.confidence,
            seq,
        });

        Self::shed_overflow(&mut inner, self.config.queue_capacity);
        true
    }

    /// Build a phrased alert from one detection.
    fn build_alert(&self, detection: &Detection) -> Alert {
        let tier = tier_for_label(&detection.label);
        let zone = if self.config.spatial_audio {
            Some(zone_for_center(detection.bbox.center_x()))
        } else {
            None
        };

        let bucket = detection
            .distance_feet
            .map(distance_bucket)
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string());
        let dedup_key = format!("{}:{}", detection.label, bucket);

        let mut message = detection.label.clone();
        if let Some(feet) = detection.distance_feet {
            let phrase = distance_phrase(feet);
            if !phrase.is_empty() {
                message = format!("{} {}", message, phrase);
            }
        }
        // The zone is spoken only when it adds direction
        match zone {
            Some(Zone::Left) => message = format!("{} on your left", message),
            Some(Zone::Right) => message = format!("{} on your right", message),
            _ => {}
        }

        Alert {
            id: Uuid::new_v4(),
            label: detection.label.clone(),
            tier,
            zone,
            distance_feet: detection.distance_feet,
            message,
            dedup_key,
            created_at: Utc::now(),
        }
    }

    /// Shed the lowest-priority entries once over capacity.
    fn shed_overflow(inner: &mut QueueInner, capacity: usize) {
        if inner.heap.len() <= capacity {
            return;
        }
        let mut entries: Vec<QueuedAlert> = std::mem::take(&mut inner.heap).into_vec();
        entries.sort_by(|a, b| b.cmp(a));
        let shed = entries.split_off(capacity);
        for dropped in &shed {
            warn!(
                "Alert queue over capacity, shedding {}",
                dropped.alert.dedup_key
            );
        }
        inner.heap = entries.into();
    }

    /// Pop the highest-priority pending alert.
    pub fn pop_next(&self) -> Option<Alert> {
        self.inner.lock().heap.pop().map(|q| q.alert)
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn duplicates_filtered(&self) -> u64 {
        self.duplicates_filtered.load(AtomicOrdering::Relaxed)
    }

    /// Start the drain task: every tick it pops at most one alert and
    /// plays it to completion before the next, so playback never
    /// overlaps and a new alert never interrupts one in progress.
    pub fn start(self: &Arc<Self>, events: broadcast::Sender<PipelineEvent>) {
        let mut handle_guard = self.drain_handle.lock();
        if handle_guard.is_some() {
            return;
        }

        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue.config.drain_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                queue.drain_one(&events).await;
            }
        });
        *handle_guard = Some(handle);
        info!(
            "Alert drain started, interval {:?}",
            self.config.drain_interval()
        );
    }

    async fn drain_one(&self, events: &broadcast::Sender<PipelineEvent>) {
        if !self.sink.is_available() {
            return;
        }
        // Lock released before playback awaits
        let next = self.inner.lock().heap.pop();
        if let Some(queued) = next {
            match self.sink.play(&queued.alert).await {
                Ok(()) => {
                    let _ = events.send(PipelineEvent::AlertPlayed(queued.alert));
                }
                Err(err) => {
                    warn!("Alert playback failed: {}", err);
                }
            }
        }
    }

    /// Stop the drain task. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.drain_handle.lock().take() {
            handle.abort();
            info!("Alert drain stopped");
        }
    }
}

impl Drop for AlertQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::LogPlaybackSink;
    use drishti_core::BoundingBox;

    fn detection(label: &str, confidence: f32, center_x: f32, distance: f32) -> Detection {
        Detection {
            class_id: 0,
            label: label.to_string(),
            confidence,
            bbox: BoundingBox {
                x: center_x - 0.05,
                y: 0.4,
                width: 0.1,
                height: 0.3,
            },
            distance_feet: Some(distance),
        }
    }

    fn queue() -> AlertQueue {
        AlertQueue::new(AlertConfig::default(), Arc::new(LogPlaybackSink)).unwrap()
    }

    #[test]
    fn test_priority_order() {
        let q = queue();
        q.offer(&[detection("book", 0.9, 0.5, 10.0)]); // low
        q.offer(&[detection("car", 0.9, 0.5, 10.0)]); // critical
        q.offer(&[detection("person", 0.9, 0.5, 10.0)]); // high

        assert_eq!(q.pop_next().unwrap().label, "car");
        assert_eq!(q.pop_next().unwrap().label, "person");
        assert_eq!(q.pop_next().unwrap().label, "book");
        assert!(q.pop_next().is_none());
    }

    #[test]
    fn test_confidence_breaks_tier_ties() {
        let q = queue();
        q.offer(&[
            detection("car", 0.7, 0.5, 10.0),
            detection("truck", 0.9, 0.5, 10.0),
        ]);
        assert_eq!(q.pop_next().unwrap().label, "truck");
        assert_eq!(q.pop_next().unwrap().label, "car");
    }

    #[test]
    fn test_insertion_order_breaks_full_ties() {
        let q = queue();
        q.offer(&[detection("car", 0.9, 0.5, 10.0)]);
        q.offer(&[detection("bus", 0.9, 0.5, 10.0)]);
        assert_eq!(q.pop_next().unwrap().label, "car");
        assert_eq!(q.pop_next().unwrap().label, "bus");
    }

    #[test]
    fn test_dedup_within_cooldown() {
        let q = queue();
        assert_eq!(q.offer(&[detection("car", 0.9, 0.5, 10.0)]), 1);
        // Same label, same distance bucket: filtered
        assert_eq!(q.offer(&[detection("car", 0.8, 0.5, 12.0)]), 0);
        assert_eq!(q.duplicates_filtered(), 1);
        assert_eq!(q.pending(), 1);
    }

    #[test]
    fn test_different_bucket_not_deduped() {
        let q = queue();
        assert_eq!(q.offer(&[detection("car", 0.9, 0.5, 50.0)]), 1);
        // Same label but now very close: a new alert
        assert_eq!(q.offer(&[detection("car", 0.9, 0.5, 2.0)]), 1);
        assert_eq!(q.duplicates_filtered(), 0);
    }

    #[test]
    fn test_admission_cap_per_cycle() {
        let q = queue();
        let cycle: Vec<Detection> = (0..6)
            .map(|i| detection(&format!("label{}", i), 0.9, 0.5, 10.0 + i as f32 * 20.0))
            .collect();
        assert_eq!(q.offer(&cycle), 3);
        assert_eq!(q.pending(), 3);
    }

    #[test]
    fn test_message_includes_zone_only_when_off_center() {
        let q = queue();
        q.offer(&[detection("person", 0.9, 0.10, 6.0)]);
        let left = q.pop_next().unwrap();
        assert_eq!(left.message, "person 6 feet ahead on your left");
        assert_eq!(left.zone, Some(Zone::Left));

        q.offer(&[detection("dog", 0.9, 0.50, 6.0)]);
        let center = q.pop_next().unwrap();
        assert_eq!(center.message, "dog 6 feet ahead");
        assert_eq!(center.zone, Some(Zone::Center));

        q.offer(&[detection("bench", 0.9, 0.90, 2.0)]);
        let right = q.pop_next().unwrap();
        assert_eq!(right.message, "bench very close on your right");
    }

    #[test]
    fn test_spatial_audio_off_drops_zone() {
        let config = AlertConfig {
            spatial_audio: false,
            ..Default::default()
        };
        let q = AlertQueue::new(config, Arc::new(LogPlaybackSink)).unwrap();
        q.offer(&[detection("person", 0.9, 0.10, 6.0)]);
        let alert = q.pop_next().unwrap();
        assert_eq!(alert.zone, None);
        assert_eq!(alert.message, "person 6 feet ahead");
    }

    #[test]
    fn test_prediction_offer_and_dedup() {
        let q = queue();
        let prediction = SmoothedPrediction {
            label: "thank you".to_string(),
            confidence: 0.9,
            support: 4,
            window_len: 5,
            degraded: false,
        };
        assert!(q.offer_prediction(&prediction));
        assert!(!q.offer_prediction(&prediction));
        assert_eq!(q.duplicates_filtered(), 1);

        let alert = q.pop_next().unwrap();
        assert_eq!(alert.message, "thank you");
        assert_eq!(alert.tier, AlertTier::Medium);
    }

    #[test]
    fn test_capacity_sheds_lowest_priority() {
        let config = AlertConfig {
            queue_capacity: 2,
            max_per_cycle: 20,
            ..Default::default()
        };
        let q = AlertQueue::new(config, Arc::new(LogPlaybackSink)).unwrap();
        q.offer(&[
            detection("book", 0.9, 0.5, 10.0),
            detection("car", 0.9, 0.5, 10.0),
            detection("person", 0.9, 0.5, 10.0),
        ]);
        assert_eq!(q.pending(), 2);
        // The low-tier book was shed, never the critical car
        assert_eq!(q.pop_next().unwrap().label, "car");
        assert_eq!(q.pop_next().unwrap().label, "person");
    }

    #[tokio::test]
    async fn test_drain_plays_in_priority_order() {
        use parking_lot::Mutex as PlMutex;

        struct RecordingSink {
            played: PlMutex<Vec<String>>,
        }

        #[async_trait::async_trait]
        impl PlaybackSink for RecordingSink {
            async fn play(&self, alert: &Alert) -> Result<(), crate::error::AlertError> {
                self.played.lock().push(alert.label.clone());
                Ok(())
            }
            fn name(&self) -> &str {
                "recording"
            }
        }

        let sink = Arc::new(RecordingSink {
            played: PlMutex::new(Vec::new()),
        });
        let config = AlertConfig {
            drain_interval_ms: 50,
            ..Default::default()
        };
        let q = Arc::new(AlertQueue::new(config, sink.clone()).unwrap());
        let (events, mut event_rx) = broadcast::channel(16);

        q.offer(&[detection("book", 0.9, 0.5, 10.0)]);
        q.offer(&[detection("car", 0.9, 0.5, 10.0)]);
        q.start(events);

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        q.stop();

        let played = sink.played.lock().clone();
        assert_eq!(played, vec!["car".to_string(), "book".to_string()]);

        // Each playback emitted an event
        let first = event_rx.try_recv().unwrap();
        assert!(matches!(first, PipelineEvent::AlertPlayed(_)));
    }
}
