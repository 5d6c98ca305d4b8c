//! Static label-to-tier mapping

use drishti_core::AlertTier;

/// Moving hazards that can close distance quickly.
const CRITICAL_LABELS: &[&str] = &["car", "truck", "bus", "motorcycle", "train"];

/// People, animals, and traffic signals the user should know about soon.
const HIGH_LABELS: &[&str] = &[
    "person",
    "bicycle",
    "dog",
    "cat",
    "horse",
    "traffic light",
    "stop sign",
];

/// Stationary obstacles at walking height.
const MEDIUM_LABELS: &[&str] = &[
    "chair",
    "couch",
    "bench",
    "bed",
    "dining table",
    "potted plant",
    "toilet",
    "tv",
    "refrigerator",
    "fire hydrant",
    "parking meter",
];

/// Priority tier for a detection label. Unknown labels default to Low.
pub fn tier_for_label(label: &str) -> AlertTier {
    if CRITICAL_LABELS.contains(&label) {
        AlertTier::Critical
    } else if HIGH_LABELS.contains(&label) {
        AlertTier::High
    } else if MEDIUM_LABELS.contains(&label) {
        AlertTier::Medium
    } else {
        AlertTier::Low
    }
}
