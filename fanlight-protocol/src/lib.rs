//! Frame codec for the fanlight BLE fan/light appliance
//!
//! Stateless builders for the outbound command families (heartbeat poll,
//! legacy on/off, raw multi-field control, light control) and a lenient
//! parser for inbound notifications.

pub mod command;
pub mod error;
pub mod hex;
pub mod mapping;
pub mod notification;
pub mod protocol;

pub use command::{
    build_legacy_control, build_light_control, build_poll, build_raw_control, FrameCommand,
    LegacyControl, LightControl, LightMode, Poll, RawControl, UnknownLightMode,
};
pub use error::FormatError;
pub use hex::{from_hex, to_hex};
pub use notification::{parse_notification, ParsedFrame};
pub use protocol::{CommandType, Frame};
