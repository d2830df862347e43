//! Session and transport error types

use fanlight_protocol::FormatError;
use thiserror::Error;

use crate::state::SessionState;

/// Errors reported by a [`Transport`](crate::Transport) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    #[error("Peripheral not found: {0}")]
    PeripheralNotFound(String),

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(String),

    #[error("Connection timed out")]
    Timeout,

    #[error("Peripheral disconnected")]
    Disconnected,

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Service discovery failed: {0}")]
    Discovery(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Subscribe failed: {0}")]
    Notify(String),

    #[error("Bluetooth error: {0}")]
    Backend(String),
}

/// Errors from session operations
#[derive(Error, Debug)]
pub enum SessionError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Connected but no writable characteristic was found
    #[error("No write characteristic selected")]
    NoWriteCharacteristic,

    /// Operation not allowed in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Operator input rejected before reaching the transport
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] FormatError),
}
