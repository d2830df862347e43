//! Inbound notification parsing
//!
//! Received frames are parsed leniently: only the first two header bytes are
//! checked, and the checksum and trailer are left to the caller.

use serde::Serialize;
use tracing::debug;

use crate::hex;
use crate::protocol::{
    self, CommandType, COMMAND_OFFSET, HEADER, LENGTH_OFFSET, MIN_FRAME_LEN, PAYLOAD_OFFSET,
};

/// A parsed inbound frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFrame {
    /// Command byte at offset 4
    pub command: u8,
    /// Declared payload length at offset 5
    pub length: u8,
    /// Payload bytes, truncated to what was actually received
    pub payload: Vec<u8>,
}

impl ParsedFrame {
    /// Known command type, `None` for unrecognized command bytes
    pub fn command_type(&self) -> Option<CommandType> {
        CommandType::from_u8(self.command)
    }

    /// True if the received payload is shorter than declared
    pub fn is_truncated(&self) -> bool {
        self.payload.len() < self.length as usize
    }

    /// Check the checksum carried in `raw` against the parsed payload
    pub fn checksum_matches(&self, raw: &[u8]) -> bool {
        if self.is_truncated() {
            return false;
        }
        let at = PAYLOAD_OFFSET + self.length as usize;
        match raw.get(at..at + 2) {
            Some(&[lo, hi]) => {
                u16::from_le_bytes([lo, hi]) == protocol::checksum(self.command, &self.payload)
            }
            _ => false,
        }
    }

    pub fn payload_hex(&self) -> String {
        hex::to_hex(&self.payload)
    }
}

/// Parse a notification into command, length and payload.
///
/// Returns `None` if the input is shorter than [`MIN_FRAME_LEN`] or does not
/// start with `20 00`.
pub fn parse_notification(bytes: &[u8]) -> Option<ParsedFrame> {
    if bytes.len() < MIN_FRAME_LEN || bytes[..2] != HEADER[..2] {
        debug!("Unparseable notification: {}", hex::to_hex(bytes));
        return None;
    }
    let command = bytes[COMMAND_OFFSET];
    let length = bytes[LENGTH_OFFSET];
    let end = (PAYLOAD_OFFSET + length as usize).min(bytes.len());
    Some(ParsedFrame {
        command,
        length,
        payload: bytes[PAYLOAD_OFFSET..end].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{build_light_control, build_poll, LightMode};
    use crate::hex::from_hex;

    #[test]
    fn test_parse_poll() {
        let frame = build_poll();
        let parsed = parse_notification(frame.as_bytes()).unwrap();
        assert_eq!(parsed.command, 0xA2);
        assert_eq!(parsed.command_type(), Some(CommandType::Poll));
        assert_eq!(parsed.length, 2);
        assert_eq!(parsed.payload, vec![0x62, 0xFA]);
        assert!(parsed.checksum_matches(frame.as_bytes()));
    }

    #[test]
    fn test_parse_control() {
        let frame = build_light_control(true, LightMode::Blast, 20, 5000, 7);
        let parsed = parse_notification(frame.as_bytes()).unwrap();
        assert_eq!(parsed.command_type(), Some(CommandType::Control));
        assert_eq!(parsed.length, 0x0D);
        assert_eq!(parsed.payload.len(), parsed.length as usize);
        assert_eq!(parsed.payload, frame.payload());
        assert!(parsed.checksum_matches(frame.as_bytes()));
    }

    #[test]
    fn test_parse_rejects() {
        assert_eq!(parse_notification(&[]), None);
        assert_eq!(parse_notification(&[0x20, 0x00, 0x3A, 0x26, 0xA2]), None);
        assert_eq!(
            parse_notification(&[0x21, 0x00, 0x3A, 0x26, 0xA2, 0x02, 0x62, 0xFA]),
            None
        );
    }

    #[test]
    fn test_parse_minimal_and_truncated() {
        // Six bytes is enough for command and length
        let parsed = parse_notification(&[0x20, 0x00, 0x00, 0x00, 0xB1, 0x04]).unwrap();
        assert_eq!(parsed.command, 0xB1);
        assert_eq!(parsed.command_type(), None);
        assert!(parsed.payload.is_empty());
        assert!(parsed.is_truncated());

        let raw = from_hex("20003a26a30d62fa0100").unwrap();
        let parsed = parse_notification(&raw).unwrap();
        assert_eq!(parsed.payload, vec![0x62, 0xFA, 0x01, 0x00]);
        assert!(!parsed.checksum_matches(&raw));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut raw = build_poll().into_bytes();
        raw[8] ^= 0x01;
        let parsed = parse_notification(&raw).unwrap();
        assert!(!parsed.checksum_matches(&raw));
    }
}
