// fanlight - BLE fan/light appliance controller
// btleplug transport, interactive console and btsnoop capture analysis

pub mod ble;
pub mod btsnoop;
pub mod console;

pub use ble::BleTransport;
pub use console::{ConsoleCommand, ConsoleParseError};
