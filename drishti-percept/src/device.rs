//! Device/battery collaborator boundary

use parking_lot::RwLock;

/// Queryable device state, polled by the orchestrator's rate-adaptation
/// step. Implemented by the platform layer.
pub trait DeviceStatus: Send + Sync {
    /// Battery charge in percent (0-100).
    fn battery_percent(&self) -> u8;
    /// Whether the app currently holds the foreground.
    fn is_foreground(&self) -> bool;
}

/// Fixed or manually adjusted device status, for tests and demos.
pub struct StaticDeviceStatus {
    battery: RwLock<u8>,
    foreground: RwLock<bool>,
}

impl StaticDeviceStatus {
    pub fn new(battery_percent: u8, foreground: bool) -> Self {
        Self {
            battery: RwLock::new(battery_percent.min(100)),
            foreground: RwLock::new(foreground),
        }
    }

    pub fn set_battery_percent(&self, percent: u8) {
        *self.battery.write() = percent.min(100);
    }

    pub fn set_foreground(&self, foreground: bool) {
        *self.foreground.write() = foreground;
    }
}

impl Default for StaticDeviceStatus {
    fn default() -> Self {
        Self::new(100, true)
    }
}

impl DeviceStatus for StaticDeviceStatus {
    fn battery_percent(&self) -> u8 {
        *self.battery.read()
    }

    fn is_foreground(&self) -> bool {
        *self.foreground.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_status_updates() {
        let status = StaticDeviceStatus::new(80, true);
        assert_eq!(status.battery_percent(), 80);
        assert!(status.is_foreground());

        status.set_battery_percent(15);
        status.set_foreground(false);
        assert_eq!(status.battery_percent(), 15);
        assert!(!status.is_foreground());
    }

    #[test]
    fn test_battery_clamped() {
        let status = StaticDeviceStatus::new(250, true);
        assert_eq!(status.battery_percent(), 100);
    }
}
