//! HCI packet decoding for btsnoop captures
//!
//! Only the packets relevant to a GATT appliance session are decoded:
//! connection setup and teardown, LE advertising reports, and ATT PDUs
//! carried on the fixed L2CAP attribute channel.

use serde::Serialize;
use std::fmt;

/// H4 packet type indicators
pub mod packet_type {
    pub const COMMAND: u8 = 0x01;
    pub const ACL_DATA: u8 = 0x02;
    pub const SCO_DATA: u8 = 0x03;
    pub const EVENT: u8 = 0x04;
}

/// HCI event codes
pub mod event {
    pub const CONNECTION_COMPLETE: u8 = 0x03;
    pub const CONNECTION_REQUEST: u8 = 0x04;
    pub const DISCONNECTION_COMPLETE: u8 = 0x05;
    pub const LE_META: u8 = 0x3E;

    pub const LE_CONNECTION_COMPLETE: u8 = 0x01;
    pub const LE_ADVERTISING_REPORT: u8 = 0x02;
    pub const LE_ENHANCED_CONNECTION_COMPLETE: u8 = 0x0A;
}

/// HCI command opcodes (OGF << 10 | OCF)
pub mod opcode {
    pub const CREATE_CONNECTION: u16 = 0x0405;
    pub const DISCONNECT: u16 = 0x0406;
    pub const LE_CREATE_CONNECTION: u16 = 0x200D;
}

/// L2CAP channel carrying ATT
pub const L2CAP_CID_ATT: u16 = 0x0004;

/// ATT opcodes
pub mod att {
    pub const READ_BY_TYPE_REQ: u8 = 0x08;
    pub const READ_BY_TYPE_RSP: u8 = 0x09;
    pub const READ_REQ: u8 = 0x0A;
    pub const READ_RSP: u8 = 0x0B;
    pub const READ_BY_GROUP_REQ: u8 = 0x10;
    pub const READ_BY_GROUP_RSP: u8 = 0x11;
    pub const WRITE_REQ: u8 = 0x12;
    pub const WRITE_RSP: u8 = 0x13;
    pub const PREPARE_WRITE_REQ: u8 = 0x16;
    pub const PREPARE_WRITE_RSP: u8 = 0x17;
    pub const EXECUTE_WRITE_REQ: u8 = 0x18;
    pub const EXECUTE_WRITE_RSP: u8 = 0x19;
    pub const HANDLE_VALUE_NTF: u8 = 0x1B;
    pub const HANDLE_VALUE_IND: u8 = 0x1D;
    pub const WRITE_CMD: u8 = 0x52;

    /// Name of an ATT opcode the analyzer reports, `None` otherwise
    pub fn name(op: u8) -> Option<&'static str> {
        Some(match op {
            READ_BY_TYPE_REQ => "Read By Type Request",
            READ_BY_TYPE_RSP => "Read By Type Response",
            READ_REQ => "Read Request",
            READ_RSP => "Read Response",
            READ_BY_GROUP_REQ => "Read By Group Type Request",
            READ_BY_GROUP_RSP => "Read By Group Type Response",
            WRITE_REQ => "Write Request",
            WRITE_RSP => "Write Response",
            PREPARE_WRITE_REQ => "Prepare Write Request",
            PREPARE_WRITE_RSP => "Prepare Write Response",
            EXECUTE_WRITE_REQ => "Execute Write Request",
            EXECUTE_WRITE_RSP => "Execute Write Response",
            HANDLE_VALUE_NTF => "Handle Value Notification",
            HANDLE_VALUE_IND => "Handle Value Indication",
            WRITE_CMD => "Write Command",
            _ => return None,
        })
    }

    /// Opcodes whose PDU starts with a 16-bit attribute handle
    pub fn has_handle(op: u8) -> bool {
        matches!(
            op,
            READ_REQ
                | WRITE_REQ
                | WRITE_CMD
                | PREPARE_WRITE_REQ
                | HANDLE_VALUE_NTF
                | HANDLE_VALUE_IND
        )
    }

    /// Opcodes whose PDU is `handle, value`
    pub fn carries_value(op: u8) -> bool {
        matches!(op, WRITE_REQ | WRITE_CMD | HANDLE_VALUE_NTF | HANDLE_VALUE_IND)
    }
}

pub fn disconnect_reason(reason: u8) -> String {
    let known = match reason {
        0x00 => "Success",
        0x05 => "Authentication Failure",
        0x06 => "PIN or Key Missing",
        0x07 => "Memory Capacity Exceeded",
        0x08 => "Connection Timeout",
        0x09 => "Connection Limit Exceeded",
        0x0C => "Command Disallowed",
        0x13 => "Remote User Terminated Connection",
        0x14 => "Remote Device Terminated due to Low Resources",
        0x15 => "Remote Device Terminated due to Power Off",
        0x16 => "Connection Terminated by Local Host",
        0x1A => "Unsupported Remote Feature",
        0x22 => "LMP Response Timeout",
        0x3E => "Connection Failed to be Established",
        other => return format!("Unknown (0x{:02X})", other),
    };
    known.to_string()
}

pub fn advertising_type_name(kind: u8) -> String {
    match kind {
        0x00 => "ADV_IND".into(),
        0x01 => "ADV_DIRECT_IND".into(),
        0x02 => "ADV_SCAN_IND".into(),
        0x03 => "ADV_NONCONN_IND".into(),
        0x04 => "SCAN_RSP".into(),
        other => format!("Unknown({})", other),
    }
}

pub fn address_type_name(kind: u8) -> String {
    match kind {
        0x00 => "Public".into(),
        0x01 => "Random".into(),
        0x02 => "Public Identity".into(),
        0x03 => "Random Identity".into(),
        other => format!("Unknown({})", other),
    }
}

/// Format a little-endian device address as `AA:BB:CC:DD:EE:FF`
pub fn format_address(bytes: &[u8]) -> String {
    bytes
        .iter()
        .rev()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn le16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

/// Capture direction from the btsnoop record flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Host to controller
    Sent,
    /// Controller to host
    Received,
}

impl Direction {
    pub fn from_flags(flags: u32) -> Self {
        if flags & 0x01 != 0 {
            Self::Received
        } else {
            Self::Sent
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "SENT"),
            Self::Received => write!(f, "RECV"),
        }
    }
}

/// Connection request, completion or create-connection command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub address: String,
    pub link_type: String,
    pub event: String,
}

/// Disconnection complete event or disconnect command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnection {
    pub handle: u16,
    pub reason: u8,
    pub reason_str: String,
}

/// One LE advertising report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub event_type: u8,
    pub address_type: String,
    pub address: String,
    pub rssi: i8,
    pub data: Vec<u8>,
}

/// An ATT PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattOperation {
    pub opcode: u8,
    pub handle: Option<u16>,
    /// PDU bytes after the opcode
    pub data: Vec<u8>,
}

impl GattOperation {
    pub fn name(&self) -> &'static str {
        att::name(self.opcode).unwrap_or("Unknown")
    }

    /// Attribute value for writes, notifications and indications
    pub fn value(&self) -> Option<&[u8]> {
        if att::carries_value(self.opcode) {
            self.data.get(2..)
        } else {
            None
        }
    }
}

/// A decoded HCI packet of interest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HciRecord {
    Connection(Connection),
    Disconnection(Disconnection),
    Advertisement(Advertisement),
    Gatt(GattOperation),
}

/// Decode an H4 packet (type byte already split off)
///
/// Returns every record of interest, which may be several for an
/// advertising report event and none for unrelated traffic.
pub fn decode_packet(kind: u8, data: &[u8]) -> Vec<HciRecord> {
    match kind {
        packet_type::EVENT => decode_event(data),
        packet_type::COMMAND => decode_command(data).into_iter().collect(),
        packet_type::ACL_DATA => decode_acl(data).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn decode_event(data: &[u8]) -> Vec<HciRecord> {
    if data.len() < 2 {
        return Vec::new();
    }
    let code = data[0];
    let len = data[1] as usize;
    let params = &data[2..(2 + len).min(data.len())];

    match code {
        event::CONNECTION_REQUEST if params.len() >= 10 => {
            vec![HciRecord::Connection(Connection {
                address: format_address(&params[..6]),
                link_type: classic_link_type(params[9]),
                event: "request".into(),
            })]
        }
        event::CONNECTION_COMPLETE if params.len() >= 11 => {
            vec![HciRecord::Connection(Connection {
                address: format_address(&params[3..9]),
                link_type: classic_link_type(params[9]),
                event: format!("complete (status={})", params[0]),
            })]
        }
        event::DISCONNECTION_COMPLETE if params.len() >= 4 => {
            let handle = le16(params, 1).unwrap_or_default() & 0x0FFF;
            vec![HciRecord::Disconnection(Disconnection {
                handle,
                reason: params[3],
                reason_str: disconnect_reason(params[3]),
            })]
        }
        event::LE_META => decode_le_meta(params),
        _ => Vec::new(),
    }
}

fn classic_link_type(byte: u8) -> String {
    let link = if byte == 0x00 { "SCO" } else { "ACL" };
    link.to_string()
}

fn decode_le_meta(params: &[u8]) -> Vec<HciRecord> {
    let Some(&subevent) = params.first() else {
        return Vec::new();
    };
    match subevent {
        event::LE_CONNECTION_COMPLETE if params.len() >= 19 => {
            vec![le_connection(params, "LE", "le_connection_complete")]
        }
        event::LE_ENHANCED_CONNECTION_COMPLETE if params.len() >= 31 => vec![le_connection(
            params,
            "LE Enhanced",
            "le_enhanced_connection_complete",
        )],
        event::LE_ADVERTISING_REPORT => decode_advertising_report(params),
        _ => Vec::new(),
    }
}

fn le_connection(params: &[u8], label: &str, event: &str) -> HciRecord {
    let status = params[1];
    let handle = le16(params, 2).unwrap_or_default() & 0x0FFF;
    let role = if params[4] == 0 { "Central" } else { "Peripheral" };
    HciRecord::Connection(Connection {
        address: format_address(&params[6..12]),
        link_type: format!("{} ({}, {})", label, role, address_type_name(params[5])),
        event: format!("{} (status={}, handle=0x{:04X})", event, status, handle),
    })
}

fn decode_advertising_report(params: &[u8]) -> Vec<HciRecord> {
    let mut records = Vec::new();
    let Some(&count) = params.get(1) else {
        return records;
    };
    let mut offset = 2;

    for _ in 0..count {
        if offset + 9 > params.len() {
            break;
        }
        let event_type = params[offset];
        let address_type = params[offset + 1];
        let address = format_address(&params[offset + 2..offset + 8]);
        let data_len = params[offset + 8] as usize;
        offset += 9;

        if offset + data_len > params.len() {
            break;
        }
        let data = params[offset..offset + data_len].to_vec();
        offset += data_len;

        let rssi = params.get(offset).map_or(0, |&b| b as i8);
        offset += 1;

        records.push(HciRecord::Advertisement(Advertisement {
            event_type,
            address_type: address_type_name(address_type),
            address,
            rssi,
            data,
        }));
    }
    records
}

fn decode_command(data: &[u8]) -> Option<HciRecord> {
    let op = le16(data, 0)?;
    let len = *data.get(2)? as usize;
    let params = &data[3..(3 + len).min(data.len())];

    match op {
        opcode::CREATE_CONNECTION if params.len() >= 6 => Some(HciRecord::Connection(Connection {
            address: format_address(&params[..6]),
            link_type: "ACL".into(),
            event: "create_connection_cmd".into(),
        })),
        opcode::LE_CREATE_CONNECTION if params.len() >= 8 => {
            Some(HciRecord::Connection(Connection {
                address: format_address(&params[2..8]),
                link_type: "LE".into(),
                event: "le_create_connection_cmd".into(),
            }))
        }
        opcode::DISCONNECT if params.len() >= 3 => {
            let reason = params[2];
            Some(HciRecord::Disconnection(Disconnection {
                handle: le16(params, 0)? & 0x0FFF,
                reason,
                reason_str: format!("Disconnect Command: {}", disconnect_reason(reason)),
            }))
        }
        _ => None,
    }
}

fn decode_acl(data: &[u8]) -> Option<HciRecord> {
    let acl_len = le16(data, 2)? as usize;
    let acl = &data[4..(4 + acl_len).min(data.len())];

    let l2cap_len = le16(acl, 0)? as usize;
    let cid = le16(acl, 2)?;
    if cid != L2CAP_CID_ATT {
        return None;
    }
    let pdu = &acl[4..(4 + l2cap_len).min(acl.len())];

    let &op = pdu.first()?;
    att::name(op)?;
    let handle = if att::has_handle(op) {
        le16(pdu, 1)
    } else {
        None
    };
    Some(HciRecord::Gatt(GattOperation {
        opcode: op,
        handle,
        data: pdu[1..].to_vec(),
    }))
}
