//! Transport seam between the session controller and a BLE stack
//!
//! The controller never touches a Bluetooth API directly. A backend (the
//! btleplug binding in the `fanlight` binary, or an in-memory mock in tests)
//! implements [`Transport`] and pushes asynchronous activity through a
//! broadcast channel of [`TransportEvent`]s.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::TransportError;

/// Bluetooth SIG base UUID, `0000xxxx-0000-1000-8000-00805f9b34fb`
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
const ALIAS_MASK: u128 = 0xFFFF_FFFF << 96;

/// Expand a 16-bit assigned number onto the Bluetooth base UUID
pub const fn bluetooth_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// 16-bit alias of a UUID on the Bluetooth base, if it has one
pub fn short_alias(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let alias = (value & ALIAS_MASK) >> 96;
    if value & !ALIAS_MASK == BLUETOOTH_BASE_UUID && alias <= 0xFFFF {
        Some(alias as u16)
    } else {
        None
    }
}

/// Opaque peripheral identifier as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PeripheralId(pub String);

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A peripheral seen while scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPeripheral {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

impl DiscoveredPeripheral {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }
}

/// Characteristic capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CharProps {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharProps {
    pub fn can_write(&self) -> bool {
        self.write || self.write_without_response
    }

    pub fn can_notify(&self) -> bool {
        self.notify || self.indicate
    }
}

impl fmt::Display for CharProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.read, "read"),
            (self.write, "write"),
            (self.write_without_response, "write-nr"),
            (self.notify, "notify"),
            (self.indicate, "indicate"),
        ];
        let names: Vec<&str> = flags.iter().filter(|(on, _)| *on).map(|(_, n)| *n).collect();
        f.write_str(&names.join("|"))
    }
}

/// A characteristic on a connected peripheral
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacteristicRef {
    pub peripheral: PeripheralId,
    pub service: Uuid,
    pub uuid: Uuid,
    pub props: CharProps,
}

/// A discovered GATT service and its characteristics, in discovery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicRef>,
}

/// Asynchronous activity reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    PeripheralDiscovered(DiscoveredPeripheral),
    ConnectionChanged {
        peripheral: PeripheralId,
        connected: bool,
    },
    Notification {
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

/// BLE stack operations the session controller relies on
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin scanning; discoveries arrive as [`TransportEvent::PeripheralDiscovered`]
    async fn start_scan(&self) -> Result<(), TransportError>;

    async fn stop_scan(&self) -> Result<(), TransportError>;

    /// Connect to a peripheral, failing with [`TransportError::Timeout`] after `timeout`
    async fn connect(&self, peripheral: &PeripheralId, timeout: Duration)
        -> Result<(), TransportError>;

    /// Discover services and characteristics in the order the stack reports them
    async fn discover_services(
        &self,
        peripheral: &PeripheralId,
    ) -> Result<Vec<Service>, TransportError>;

    async fn write(
        &self,
        characteristic: &CharacteristicRef,
        bytes: &[u8],
        without_response: bool,
    ) -> Result<(), TransportError>;

    /// Enable or disable notifications; values arrive as [`TransportEvent::Notification`]
    async fn set_notify(
        &self,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<(), TransportError>;

    async fn disconnect(&self, peripheral: &PeripheralId) -> Result<(), TransportError>;

    /// Subscribe to asynchronous transport events
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bluetooth_uuid() {
        assert_eq!(
            bluetooth_uuid(0xFFE5).to_string(),
            "0000ffe5-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(short_alias(&bluetooth_uuid(0x180A)), Some(0x180A));
    }

    #[test]
    fn test_short_alias_rejects_vendor_uuid() {
        let vendor = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e);
        assert_eq!(short_alias(&vendor), None);
        // 32-bit alias on the base UUID
        let wide = Uuid::from_u128(BLUETOOTH_BASE_UUID | (0x0001_FFE5u128 << 96));
        assert_eq!(short_alias(&wide), None);
    }

    #[test]
    fn test_char_props() {
        let props = CharProps {
            write_without_response: true,
            notify: true,
            ..Default::default()
        };
        assert!(props.can_write());
        assert!(props.can_notify());
        assert_eq!(props.to_string(), "write-nr|notify");
        assert!(!CharProps::default().can_write());
    }
}
