//! Playback sink: the audio/haptic collaborator boundary

use crate::error::AlertError;
use async_trait::async_trait;
use drishti_core::Alert;
use tracing::info;

/// A single audio/haptic output channel. `play` is invoked at most once
/// at a time; the drain task awaits completion before popping the next
/// alert, so implementations never see overlapping calls.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Play one alert to completion.
    async fn play(&self, alert: &Alert) -> Result<(), AlertError>;

    /// Whether the underlying channel is usable.
    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str;
}

/// Sink that logs alerts instead of playing them; the default when no
/// platform audio layer is wired up.
#[derive(Default)]
pub struct LogPlaybackSink;

#[async_trait]
impl PlaybackSink for LogPlaybackSink {
    async fn play(&self, alert: &Alert) -> Result<(), AlertError> {
        info!("[{}] {}", alert.tier, alert.message);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
