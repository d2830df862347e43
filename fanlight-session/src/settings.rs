//! Session configuration and remembered device settings

use std::time::Duration;

use fanlight_protocol::command::LEGACY_FLAGS_DEFAULT;
use fanlight_protocol::{
    mapping, Frame, FrameCommand, LegacyControl, LightControl, LightMode, RawControl,
};
use serde::Serialize;

use crate::selection::ServiceTags;

/// Mode byte selecting the fan in raw and legacy control frames
pub const MODE_FAN: u8 = 0x01;
/// Mode byte for the combined power toggle on the legacy path
pub const MODE_POWER: u8 = 0x01;

/// Tunables for a [`SessionController`](crate::SessionController)
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Heartbeat poll period
    pub heartbeat_period: Duration,
    /// Default scan duration for front ends
    pub scan_duration: Duration,
    /// Service tags for characteristic selection
    pub service_tags: ServiceTags,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_period: Duration::from_secs(1),
            scan_duration: Duration::from_secs(5),
            service_tags: ServiceTags::default(),
        }
    }
}

/// Operator intents remembered across sends so toggles re-send current values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceSettings {
    /// Fan speed, percent
    pub speed: u32,
    pub light_mode: LightMode,
    /// Light intensity, percent
    pub intensity: u32,
    /// Daylight, Kelvin
    pub kelvin: u32,
    /// Effect frequency (1-10)
    pub frequency: u8,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            speed: 50,
            light_mode: LightMode::White,
            intensity: 50,
            kelvin: 3200,
            frequency: mapping::DEFAULT_FREQUENCY,
        }
    }
}

impl DeviceSettings {
    /// Legacy power toggle carrying fan speed and daylight
    pub fn power_frame(&self, enabled: bool) -> Frame {
        LegacyControl::new(
            enabled,
            MODE_POWER,
            mapping::legacy_speed_percent_to_value(self.speed),
            mapping::kelvin_to_daylight(self.kelvin),
            LEGACY_FLAGS_DEFAULT,
        )
        .build()
    }

    /// Raw fan control at the remembered speed
    pub fn fan_frame(&self, enabled: bool) -> Frame {
        RawControl::new(
            enabled,
            MODE_FAN,
            0,
            0,
            mapping::speed_percent_to_value(self.speed),
            0,
        )
        .build()
    }

    /// Light control with the remembered light settings
    pub fn light_frame(&self, enabled: bool) -> Frame {
        LightControl::new(enabled, self.light_mode, self.intensity, self.kelvin)
            .frequency(self.frequency)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_period, Duration::from_secs(1));
        assert_eq!(config.service_tags.write_service, 0xFFE5);

        let settings = DeviceSettings::default();
        assert_eq!(settings.light_mode, LightMode::White);
        assert_eq!(settings.frequency, 5);
    }

    #[test]
    fn test_default_light_frame_is_reference_white() {
        let frame = DeviceSettings::default().light_frame(true);
        assert_eq!(frame.to_hex(), "20003a26a30d62fa0100ff32800cffffffff08f4070d0a");
    }

    #[test]
    fn test_fan_frame_uses_raw_speed_range() {
        let settings = DeviceSettings {
            speed: 100,
            ..Default::default()
        };
        let bytes = settings.fan_frame(true).into_bytes();
        assert_eq!(&bytes[8..12], &[0x01, MODE_FAN, 0x00, 0x00]);
        assert_eq!(&bytes[12..14], &[0x19, 0x64]);
        assert_eq!(&bytes[14..18], &[0; 4]);
    }

    #[test]
    fn test_power_frame_uses_legacy_speed_range() {
        let settings = DeviceSettings {
            speed: 100,
            ..Default::default()
        };
        let bytes = settings.power_frame(false).into_bytes();
        assert_eq!(bytes[8], 0x00);
        assert_eq!(&bytes[10..12], &[0x15, 0x18]);
        assert_eq!(&bytes[12..14], &[0x80, 0x0C]);
        assert_eq!(bytes[14], 0xFF);
    }
}
