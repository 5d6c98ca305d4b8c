//! Property tests for the pure decision functions

use chrono::Utc;
use drishti_alert::{distance_bucket, distance_phrase, zone_for_center};
use drishti_core::{BoundingBox, InferenceResult, ModelFamily, Zone};
use drishti_percept::backends::detector::{compute_iou, estimate_distance_feet};
use drishti_percept::smoothing::SmoothingBuffer;
use proptest::prelude::*;

proptest! {
    #[test]
    fn zone_covers_every_center(center in 0.0f32..=1.0f32) {
        // Every center maps to exactly one zone, with the documented cuts
        let zone = zone_for_center(center);
        if center < 0.35 {
            prop_assert_eq!(zone, Zone::Left);
        } else if center <= 0.65 {
            prop_assert_eq!(zone, Zone::Center);
        } else {
            prop_assert_eq!(zone, Zone::Right);
        }
    }

    #[test]
    fn distance_phrase_is_never_raw_precision(feet in 0.0f32..500.0f32) {
        let phrase = distance_phrase(feet);
        prop_assert!(!phrase.is_empty());
        // No decimal points ever reach the spoken channel
        prop_assert!(!phrase.contains('.'));
    }

    #[test]
    fn distance_bucket_is_monotonic(a in 0.0f32..200.0f32, b in 0.0f32..200.0f32) {
        let (near, far) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(distance_bucket(near) <= distance_bucket(far));
    }

    #[test]
    fn estimated_distance_is_bounded(height in 0.0f32..=1.5f32) {
        let feet = estimate_distance_feet(height);
        prop_assert!((1.0..=100.0).contains(&feet));
    }

    #[test]
    fn iou_is_bounded_and_symmetric(
        ax in 0.0f32..1.0, ay in 0.0f32..1.0, aw in 0.0f32..1.0, ah in 0.0f32..1.0,
        bx in 0.0f32..1.0, by in 0.0f32..1.0, bw in 0.0f32..1.0, bh in 0.0f32..1.0,
    ) {
        let a = BoundingBox { x: ax, y: ay, width: aw, height: ah };
        let b = BoundingBox { x: bx, y: by, width: bw, height: bh };
        let forward = compute_iou(&a, &b);
        let backward = compute_iou(&b, &a);
        prop_assert!((0.0..=1.0).contains(&forward));
        prop_assert!((forward - backward).abs() < 1e-5);
    }

    #[test]
    fn smoothing_output_respects_quorum(
        labels in proptest::collection::vec(0u8..3, 1..40),
        quorum in 0.4f32..=1.0f32,
    ) {
        let mut buffer = SmoothingBuffer::fixed(ModelFamily::Classifier, 5, quorum);
        let names = ["A", "B", "C"];

        for &label in &labels {
            let result = InferenceResult {
                family: ModelFamily::Classifier,
                class_id: label as usize,
                label: names[label as usize].to_string(),
                confidence: 0.8,
                bbox: None,
                features: None,
                frame_timestamp: Utc::now(),
            };
            if let Some(prediction) = buffer.push(result) {
                // Emitted predictions always satisfy the quorum and the
                // support/window invariant
                prop_assert!(prediction.support <= prediction.window_len);
                prop_assert!(
                    prediction.support as f32 + 1e-4 >= quorum * prediction.window_len as f32
                );
                prop_assert!((0.0..=1.0).contains(&prediction.confidence));
            }
        }
    }
}

#[test]
fn documented_round_trip_examples() {
    // The boundary examples called out in the pipeline's contract
    assert_eq!(zone_for_center(0.10), Zone::Left);
    assert_eq!(zone_for_center(0.50), Zone::Center);
    assert_eq!(zone_for_center(0.90), Zone::Right);
}
