//! Configuration for the alert layer

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Alert queue configuration. Defaults are documented values, all
/// tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum time before a semantically identical alert may re-queue
    pub cooldown_secs: u64,

    /// Interval between drain ticks; each tick plays at most one alert
    pub drain_interval_ms: u64,

    /// Detections admitted per processing cycle, to avoid flooding
    pub max_per_cycle: usize,

    /// Include spatial zones ("on your left") in alert phrasing
    pub spatial_audio: bool,

    /// Queued alerts beyond this shed the oldest lowest-tier entry
    pub queue_capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 5,
            drain_interval_ms: 500,
            max_per_cycle: 3,
            spatial_audio: true,
            queue_capacity: 64,
        }
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.cooldown_secs == 0 || self.cooldown_secs > 600 {
            return Err("Cooldown must be between 1s and 600s".to_string());
        }
        if self.drain_interval_ms < 50 || self.drain_interval_ms > 10_000 {
            return Err("Drain interval must be between 50ms and 10s".to_string());
        }
        if self.max_per_cycle == 0 || self.max_per_cycle > 20 {
            return Err("Max per cycle must be between 1 and 20".to_string());
        }
        if self.queue_capacity == 0 || self.queue_capacity > 10_000 {
            return Err("Queue capacity must be between 1 and 10000".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_is_valid() {
        let config = AlertConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cooldown_secs, 5);
        assert_eq!(config.drain_interval_ms, 500);
        assert_eq!(config.max_per_cycle, 3);
        assert!(config.spatial_audio);
    }

    #[test]
    fn test_config_validation_bounds() {
        let mut config = AlertConfig::default();
        config.cooldown_secs = 0;
        assert!(config.validate().is_err());

        config = AlertConfig::default();
        config.drain_interval_ms = 10;
        assert!(config.validate().is_err());

        config = AlertConfig::default();
        config.max_per_cycle = 0;
        assert!(config.validate().is_err());

        config = AlertConfig::default();
        config.queue_capacity = 0;
        assert!(config.validate().is_err());
    }
}
