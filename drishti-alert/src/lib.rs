//! drishti-alert: Prioritized, deduplicated spoken/haptic alerts
//!
//! Converts accepted perception results into alerts, orders them by
//! priority tier, filters repeats through a cooldown cache, and plays
//! them one at a time through a single playback sink.

pub mod config;
pub mod error;
pub mod playback;
pub mod priority;
pub mod queue;
pub mod spatial;

pub use config::AlertConfig;
pub use error::AlertError;
pub use playback::{LogPlaybackSink, PlaybackSink};
pub use priority::tier_for_label;
pub use queue::AlertQueue;
pub use spatial::{distance_bucket, distance_phrase, zone_for_center};
