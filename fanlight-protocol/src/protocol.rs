//! Protocol constants and framing for the fanlight appliance
//!
//! Every frame on the wire has the same envelope:
//!
//! ```text
//! [20 00 3A 26] [cmd] [len] [62 FA] [data...] [cs_lo cs_hi] [0D 0A]
//! ```
//!
//! `len` counts the device id plus the data bytes. The checksum is a 16-bit
//! wrapping sum of everything from the last header byte (`0x26`) through the
//! end of the payload, emitted low byte first.

use std::fmt;

use serde::Serialize;

use crate::hex;

/// Fixed frame header
pub const HEADER: [u8; 4] = [0x20, 0x00, 0x3A, 0x26];

/// Fixed frame trailer (CR LF)
pub const TRAILER: [u8; 2] = [0x0D, 0x0A];

/// Appliance class identifier carried at the start of every payload
pub const DEVICE_ID: [u8; 2] = [0x62, 0xFA];

/// Offset of the command byte
pub const COMMAND_OFFSET: usize = 4;
/// Offset of the payload length byte
pub const LENGTH_OFFSET: usize = 5;
/// Offset of the first payload byte (the device id)
pub const PAYLOAD_OFFSET: usize = 6;

/// Smallest byte count that still carries a command and a length
pub const MIN_FRAME_LEN: usize = 6;

/// Bytes of envelope around the payload: header, cmd, len, checksum, trailer
pub const ENVELOPE_LEN: usize = HEADER.len() + 2 + 2 + TRAILER.len();

/// Length byte of every control frame (device id + 11 data bytes)
pub const CONTROL_PAYLOAD_LEN: u8 = 0x0D;

/// Data bytes of a control frame, excluding the device id
pub const CONTROL_DATA_LEN: usize = CONTROL_PAYLOAD_LEN as usize - DEVICE_ID.len();

/// Command bytes
pub mod cmd {
    /// Heartbeat poll
    pub const POLL: u8 = 0xA2;
    /// Every control variant (legacy, raw, light)
    pub const CONTROL: u8 = 0xA3;

    /// Get human-readable name for command byte
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            POLL => "POLL",
            CONTROL => "CONTROL",
            _ => "UNKNOWN",
        }
    }
}

/// Checksum base constants.
///
/// Raw and light control payloads end with [`checksum_base::CONTROL`], which
/// folds a fixed `0x08` into their checksum. The value was recovered from
/// captured traffic and has not been confirmed for other command variants.
pub mod checksum_base {
    /// Legacy on/off payloads carry no base byte
    pub const LEGACY: u8 = 0x00;
    /// Raw and light control payloads end with this byte
    pub const CONTROL: u8 = 0x08;
}

/// Command type carried at offset 4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum CommandType {
    /// Heartbeat poll (0xA2)
    Poll = cmd::POLL,
    /// Control frame (0xA3)
    Control = cmd::CONTROL,
}

impl CommandType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            cmd::POLL => Some(Self::Poll),
            cmd::CONTROL => Some(Self::Control),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(cmd::name(*self as u8))
    }
}

/// Compute the frame checksum for a command and its payload.
///
/// The payload includes the device id. The sum starts from the last header
/// byte, then adds the command byte, the length byte and every payload byte.
pub fn checksum(command: u8, payload: &[u8]) -> u16 {
    let seed = u16::from(HEADER[3])
        .wrapping_add(u16::from(command))
        .wrapping_add(payload.len() as u8 as u16);
    payload
        .iter()
        .fold(seed, |sum, &b| sum.wrapping_add(u16::from(b)))
}

/// Build a complete frame around a payload (device id + data)
pub fn build_frame(command: CommandType, payload: &[u8]) -> Frame {
    let mut buf = Vec::with_capacity(payload.len() + ENVELOPE_LEN);
    buf.extend_from_slice(&HEADER);
    buf.push(command.as_u8());
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum(command.as_u8(), payload).to_le_bytes());
    buf.extend_from_slice(&TRAILER);
    Frame { bytes: buf }
}

/// Prefix device data with the device id
pub fn with_device_id(data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(DEVICE_ID.len() + data.len());
    payload.extend_from_slice(&DEVICE_ID);
    payload.extend_from_slice(data);
    payload
}

/// A complete, immutable outbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Raw frame bytes, header through trailer
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn command(&self) -> u8 {
        self.bytes[COMMAND_OFFSET]
    }

    pub fn command_type(&self) -> Option<CommandType> {
        CommandType::from_u8(self.command())
    }

    /// Declared payload length (device id + data)
    pub fn payload_len(&self) -> u8 {
        self.bytes[LENGTH_OFFSET]
    }

    /// Payload bytes (device id + data)
    pub fn payload(&self) -> &[u8] {
        &self.bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + self.payload_len() as usize]
    }

    /// Checksum as carried on the wire
    pub fn checksum(&self) -> u16 {
        let at = PAYLOAD_OFFSET + self.payload_len() as usize;
        u16::from_le_bytes([self.bytes[at], self.bytes[at + 1]])
    }

    /// Lowercase hex rendering of the whole frame
    pub fn to_hex(&self) -> String {
        hex::to_hex(&self.bytes)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
