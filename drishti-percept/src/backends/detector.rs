//! Object detector decoding: thresholding, NMS, distance estimation

use crate::backends::RawOutput;
use drishti_core::{BoundingBox, Detection};
use tracing::debug;

/// COCO class names (80 classes)
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// IoU above which two boxes of the same class are considered duplicates.
const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Cap on boxes surviving decode, keeps downstream work bounded.
const MAX_DETECTIONS: usize = 25;

/// Reference constant for height-based distance estimation: a box filling
/// half the frame height reads as roughly ten feet away.
const DISTANCE_SCALE_FEET: f32 = 5.0;

/// Decode raw detector boxes into stabilizer-ready detections.
pub fn decode(raw: &RawOutput, threshold: f32) -> Vec<Detection> {
    let mut candidates: Vec<Detection> = raw
        .boxes
        .iter()
        .filter(|b| b.score.is_finite() && b.score >= threshold)
        .filter(|b| b.width > 0.0 && b.height > 0.0)
        .filter_map(|b| {
            let label = COCO_CLASSES.get(b.class_id)?;
            let bbox = BoundingBox {
                x: b.x.clamp(0.0, 1.0),
                y: b.y.clamp(0.0, 1.0),
                width: b.width.clamp(0.0, 1.0),
                height: b.height.clamp(0.0, 1.0),
            };
            Some(Detection {
                class_id: b.class_id,
                label: label.to_string(),
                confidence: b.score.clamp(0.0, 1.0),
                bbox,
                distance_feet: Some(estimate_distance_feet(bbox.height)),
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Greedy per-class NMS
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let duplicate = kept.iter().any(|k| {
            k.class_id == candidate.class_id
                && compute_iou(&k.bbox, &candidate.bbox) > NMS_IOU_THRESHOLD
        });
        if !duplicate {
            kept.push(candidate);
            if kept.len() >= MAX_DETECTIONS {
                break;
            }
        }
    }

    debug!("Decoded {} detections from {} raw boxes", kept.len(), raw.boxes.len());
    kept
}

/// Estimate distance from normalized box height. Coarse by design: the
/// alert layer buckets distances to close/medium/far before phrasing.
pub fn estimate_distance_feet(normalized_height: f32) -> f32 {
    if normalized_height <= 0.0 || !normalized_height.is_finite() {
        return 100.0;
    }
    (DISTANCE_SCALE_FEET / normalized_height).clamp(1.0, 100.0)
}

/// Compute IoU (Intersection over Union) between two normalized boxes.
pub fn compute_iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    if !a.x.is_finite()
        || !a.y.is_finite()
        || !a.width.is_finite()
        || !a.height.is_finite()
        || !b.x.is_finite()
        || !b.y.is_finite()
        || !b.width.is_finite()
        || !b.height.is_finite()
    {
        return 0.0;
    }
    if a.width < 0.0 || a.height < 0.0 || b.width < 0.0 || b.height < 0.0 {
        return 0.0;
    }

    let inter_x_min = a.x.max(b.x);
    let inter_y_min = a.y.max(b.y);
    let inter_x_max = (a.x + a.width).min(b.x + b.width);
    let inter_y_max = (a.y + a.height).min(b.y + b.height);

    if inter_x_max <= inter_x_min || inter_y_max <= inter_y_min {
        return 0.0;
    }

    let inter_area = (inter_x_max - inter_x_min) * (inter_y_max - inter_y_min);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area <= 0.0 || !union_area.is_finite() {
        return 0.0;
    }

    let iou = inter_area / union_area;
    if iou.is_finite() && (0.0..=1.0).contains(&iou) {
        iou
    } else {
        0.0
    }
}
