//! Session controller for the fanlight BLE fan/light appliance
//!
//! Drives one peripheral at a time through scan, connect, characteristic
//! selection and a 1 s heartbeat, on top of any [`Transport`] backend.

pub mod controller;
pub mod error;
pub mod heartbeat;
pub mod log;
pub mod selection;
pub mod settings;
pub mod state;
pub mod transport;

pub use controller::{SessionController, SessionEvent};
pub use error::{SessionError, TransportError};
pub use heartbeat::Heartbeat;
pub use log::{EventLog, LogEntry, LogKind};
pub use selection::{select_characteristics, CharacteristicSelection, ServiceTags};
pub use settings::{DeviceSettings, SessionConfig};
pub use state::SessionState;
pub use transport::{
    bluetooth_uuid, short_alias, CharProps, CharacteristicRef, DiscoveredPeripheral, PeripheralId,
    Service, Transport, TransportEvent,
};
