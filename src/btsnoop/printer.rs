//! Output formatting for the btsnoop analyzer

use fanlight_protocol::protocol::cmd;
use fanlight_protocol::{parse_notification, to_hex, ParsedFrame};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, Write};
use std::str::FromStr;

use super::hci::{
    advertising_type_name, Advertisement, Connection, Direction, Disconnection, GattOperation,
};

/// Output format for the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Record filter for selective display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFilter {
    #[default]
    All,
    Connections,
    Adverts,
    Gatt,
    /// GATT values that parse as appliance frames
    Frames,
}

impl FromStr for RecordFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "connections" | "conn" | "connection" => Ok(Self::Connections),
            "adverts" | "adv" | "advertisements" => Ok(Self::Adverts),
            "gatt" | "att" => Ok(Self::Gatt),
            "frames" | "frame" => Ok(Self::Frames),
            _ => Err(format!("Unknown filter: {}", s)),
        }
    }
}

/// A decoded record for JSON output
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DecodedRecord {
    #[serde(rename = "connection")]
    Connection {
        timestamp: f64,
        direction: Direction,
        address: String,
        link_type: String,
        event: String,
    },
    #[serde(rename = "disconnection")]
    Disconnection {
        timestamp: f64,
        handle: u16,
        reason: u8,
        reason_str: String,
    },
    #[serde(rename = "advert")]
    Advert {
        timestamp: f64,
        address: String,
        address_type: String,
        event_type: String,
        rssi: i8,
        data: String,
    },
    #[serde(rename = "gatt")]
    Gatt {
        timestamp: f64,
        direction: Direction,
        operation: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<u16>,
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        frame: Option<ParsedFrame>,
    },
}

/// Output printer
pub struct Printer {
    format: OutputFormat,
    filter: RecordFilter,
    out: Mutex<Box<dyn Write + Send>>,
}

impl Printer {
    /// Printer writing to stdout
    pub fn new(format: OutputFormat, filter: RecordFilter) -> Self {
        Self {
            format,
            filter,
            out: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Send the report to `out` instead of stdout
    pub fn with_output(mut self, out: Box<dyn Write + Send>) -> Self {
        self.out = Mutex::new(out);
        self
    }

    pub fn flush(&self) -> io::Result<()> {
        self.out.lock().flush()
    }

    fn shows(&self, kind: RecordFilter) -> bool {
        self.filter == RecordFilter::All || self.filter == kind
    }

    fn emit_json(&self, record: &DecodedRecord) -> io::Result<()> {
        let mut out = self.out.lock();
        serde_json::to_writer(&mut *out, record)?;
        writeln!(out)
    }

    pub fn print_connection(
        &self,
        timestamp: f64,
        direction: Direction,
        conn: &Connection,
    ) -> io::Result<()> {
        if !self.shows(RecordFilter::Connections) {
            return Ok(());
        }
        match self.format {
            OutputFormat::Text => writeln!(
                self.out.lock(),
                "{:.6} {} CONN {} {} | {}",
                timestamp,
                direction,
                conn.address,
                conn.link_type,
                conn.event
            ),
            OutputFormat::Json => self.emit_json(&DecodedRecord::Connection {
                timestamp,
                direction,
                address: conn.address.clone(),
                link_type: conn.link_type.clone(),
                event: conn.event.clone(),
            }),
        }
    }

    /// Disconnections are shown alongside connections
    pub fn print_disconnection(&self, timestamp: f64, disc: &Disconnection) -> io::Result<()> {
        if !self.shows(RecordFilter::Connections) {
            return Ok(());
        }
        match self.format {
            OutputFormat::Text => writeln!(
                self.out.lock(),
                "{:.6} DISC handle=0x{:04X} {}",
                timestamp,
                disc.handle,
                disc.reason_str
            ),
            OutputFormat::Json => self.emit_json(&DecodedRecord::Disconnection {
                timestamp,
                handle: disc.handle,
                reason: disc.reason,
                reason_str: disc.reason_str.clone(),
            }),
        }
    }

    pub fn print_advertisement(&self, timestamp: f64, adv: &Advertisement) -> io::Result<()> {
        if !self.shows(RecordFilter::Adverts) {
            return Ok(());
        }
        let event_type = advertising_type_name(adv.event_type);
        match self.format {
            OutputFormat::Text => writeln!(
                self.out.lock(),
                "{:.6} ADV  {} ({}) {} RSSI {} dBm {}",
                timestamp,
                adv.address,
                adv.address_type,
                event_type,
                adv.rssi,
                to_hex(&adv.data)
            ),
            OutputFormat::Json => self.emit_json(&DecodedRecord::Advert {
                timestamp,
                address: adv.address.clone(),
                address_type: adv.address_type.clone(),
                event_type,
                rssi: adv.rssi,
                data: to_hex(&adv.data),
            }),
        }
    }

    /// Print an ATT operation, decoding its value as a device frame when possible.
    ///
    /// Returns true if the value parsed as a frame.
    pub fn print_gatt(
        &self,
        timestamp: f64,
        direction: Direction,
        op: &GattOperation,
    ) -> io::Result<bool> {
        let frame = op.value().and_then(parse_notification);
        let is_frame = frame.is_some();
        let visible = match self.filter {
            RecordFilter::All | RecordFilter::Gatt => true,
            RecordFilter::Frames => is_frame,
            _ => false,
        };
        if !visible {
            return Ok(is_frame);
        }

        match self.format {
            OutputFormat::Text => {
                let handle = op
                    .handle
                    .map(|h| format!(" handle=0x{:04X}", h))
                    .unwrap_or_default();
                let mut out = self.out.lock();
                writeln!(
                    out,
                    "{:.6} {} ATT  {}{} {}",
                    timestamp,
                    direction,
                    op.name(),
                    handle,
                    to_hex(&op.data)
                )?;
                if let Some(f) = &frame {
                    let truncated = if f.is_truncated() { " (truncated)" } else { "" };
                    writeln!(
                        out,
                        "           frame 0x{:02x} {} len={} payload={}{}",
                        f.command,
                        cmd::name(f.command),
                        f.length,
                        f.payload_hex(),
                        truncated
                    )?;
                }
            }
            OutputFormat::Json => self.emit_json(&DecodedRecord::Gatt {
                timestamp,
                direction,
                operation: op.name(),
                handle: op.handle,
                data: to_hex(&op.data),
                frame,
            })?,
        }
        Ok(is_frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_filter_parse() {
        assert_eq!(RecordFilter::from_str("all").unwrap(), RecordFilter::All);
        assert_eq!(RecordFilter::from_str("").unwrap(), RecordFilter::All);
        assert_eq!(
            RecordFilter::from_str("Connections").unwrap(),
            RecordFilter::Connections
        );
        assert_eq!(RecordFilter::from_str("adv").unwrap(), RecordFilter::Adverts);
        assert_eq!(RecordFilter::from_str("att").unwrap(), RecordFilter::Gatt);
        assert_eq!(RecordFilter::from_str("frames").unwrap(), RecordFilter::Frames);
        assert!(RecordFilter::from_str("usb").is_err());
    }

    #[test]
    fn test_gatt_record_json_shape() {
        let record = DecodedRecord::Gatt {
            timestamp: 1.5,
            direction: Direction::Sent,
            operation: "Write Command",
            handle: Some(0x0E),
            data: "0e00".into(),
            frame: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "gatt");
        assert_eq!(json["direction"], "sent");
        assert_eq!(json["handle"], 14);
        assert!(json.get("frame").is_none());
    }
}
