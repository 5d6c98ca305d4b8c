//! Spatial placement and distance phrasing

use drishti_core::Zone;

/// Left/center boundary as a fraction of frame width.
const LEFT_BOUNDARY: f32 = 0.35;
/// Center/right boundary as a fraction of frame width.
const RIGHT_BOUNDARY: f32 = 0.65;

/// Distances below this phrase as "very close".
const VERY_CLOSE_FEET: f32 = 4.0;
/// Distances below this phrase with the rounded foot count; beyond it
/// they round to tens.
const NEAR_FEET: f32 = 10.0;

/// Map a normalized horizontal center to a zone.
pub fn zone_for_center(center_x: f32) -> Zone {
    if center_x < LEFT_BOUNDARY {
        Zone::Left
    } else if center_x <= RIGHT_BOUNDARY {
        Zone::Center
    } else {
        Zone::Right
    }
}

/// Coarse distance bucket index feeding the dedup key. Precision beyond
/// close/medium/far is not actionable for a spoken alert.
pub fn distance_bucket(distance_feet: f32) -> u8 {
    if distance_feet < VERY_CLOSE_FEET {
        0
    } else if distance_feet < NEAR_FEET {
        1
    } else {
        2
    }
}

/// Qualitative phrase for a distance estimate.
pub fn distance_phrase(distance_feet: f32) -> String {
    if !distance_feet.is_finite() || distance_feet < 0.0 {
        return String::new();
    }
    if distance_feet < VERY_CLOSE_FEET {
        "very close".to_string()
    } else if distance_feet < NEAR_FEET {
        format!("{} feet ahead", distance_feet.round() as u32)
    } else {
        let rounded_tens = ((distance_feet / 10.0).round() as u32).max(1) * 10;
        format!("about {} feet ahead", rounded_tens)
    }
}
