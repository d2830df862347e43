//! btsnoop HCI log analyzer
//!
//! Reads `btsnoop_hci.log` captures (as produced by Android's HCI snoop log
//! or `btmon -w`) and prints connection activity, advertising reports and
//! ATT traffic. ATT values that parse as appliance frames are decoded.
//!
//! # Example
//!
//! ```ignore
//! use fanlight::btsnoop::{BtsnoopAnalyzer, OutputFormat, RecordFilter};
//!
//! let analyzer = BtsnoopAnalyzer::new(OutputFormat::Text, RecordFilter::Frames);
//! analyzer.analyze_file("btsnoop_hci.log".as_ref())?;
//! ```

pub mod hci;
mod printer;

pub use hci::{decode_packet, Direction, HciRecord};
pub use printer::{DecodedRecord, OutputFormat, Printer, RecordFilter};

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, warn};

pub const MAGIC: &[u8; 8] = b"btsnoop\0";
pub const VERSION: u32 = 1;
/// HCI UART (H4) datalink
pub const DATALINK_H4: u32 = 1002;
pub const FILE_HEADER_LEN: usize = 16;
pub const RECORD_HEADER_LEN: usize = 24;
/// Microseconds between 0000-01-01 and the Unix epoch
pub const UNIX_EPOCH_OFFSET_US: i64 = 0x00dc_ddb3_0f2f_8000;

#[derive(Debug, Error)]
pub enum BtsnoopError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File too small to be a btsnoop capture")]
    TooShort,

    #[error("Invalid btsnoop magic: {0:02x?}")]
    BadMagic([u8; 8]),

    #[error("{0}")]
    Filter(String),
}

/// One capture record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Microseconds since 0000-01-01
    pub timestamp_us: i64,
    pub direction: Direction,
    pub packet_type: u8,
    /// Packet bytes after the H4 type indicator
    pub data: Vec<u8>,
}

impl Record {
    /// Microseconds since the Unix epoch
    pub fn unix_us(&self) -> i64 {
        self.timestamp_us - UNIX_EPOCH_OFFSET_US
    }
}

fn be32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Parse a whole capture into records.
///
/// A truncated final record ends the capture without error. Empty records
/// are skipped.
pub fn parse_capture(bytes: &[u8]) -> Result<Vec<Record>, BtsnoopError> {
    if bytes.len() < FILE_HEADER_LEN {
        return Err(BtsnoopError::TooShort);
    }
    let mut magic = [0u8; 8];
    magic.copy_from_slice(&bytes[..8]);
    if &magic != MAGIC {
        return Err(BtsnoopError::BadMagic(magic));
    }
    let version = be32(bytes, 8);
    let datalink = be32(bytes, 12);
    if version != VERSION {
        warn!("Unexpected btsnoop version {}, expected {}", version, VERSION);
    }
    if datalink != DATALINK_H4 {
        warn!(
            "Unexpected datalink type {}, expected {}",
            datalink, DATALINK_H4
        );
    }

    let mut records = Vec::new();
    let mut offset = FILE_HEADER_LEN;
    while offset + RECORD_HEADER_LEN <= bytes.len() {
        let header = &bytes[offset..offset + RECORD_HEADER_LEN];
        let included = be32(header, 4) as usize;
        let flags = be32(header, 8);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&header[16..24]);
        let timestamp_us = i64::from_be_bytes(ts);
        offset += RECORD_HEADER_LEN;

        let Some(packet) = bytes.get(offset..offset + included) else {
            debug!("Truncated record at offset {}", offset - RECORD_HEADER_LEN);
            break;
        };
        offset += included;

        if let Some((&packet_type, data)) = packet.split_first() {
            records.push(Record {
                timestamp_us,
                direction: Direction::from_flags(flags),
                packet_type,
                data: data.to_vec(),
            });
        }
    }
    Ok(records)
}

/// Record statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacketStats {
    pub records: u64,
    pub commands: u64,
    pub events: u64,
    pub acl: u64,
    pub other: u64,
    pub connections: u64,
    pub disconnections: u64,
    pub advertisements: u64,
    pub gatt_operations: u64,
    pub frames: u64,
    /// First and last timestamps, microseconds since the Unix epoch
    pub span_us: Option<(i64, i64)>,
}

impl PacketStats {
    pub fn print_summary(&self) {
        eprintln!("\nRecord statistics:");
        eprintln!("  Records:            {}", self.records);
        eprintln!("    HCI commands:     {}", self.commands);
        eprintln!("    HCI events:       {}", self.events);
        eprintln!("    ACL data:         {}", self.acl);
        eprintln!("    Other:            {}", self.other);
        eprintln!("  Connections:        {}", self.connections);
        eprintln!("  Disconnections:     {}", self.disconnections);
        eprintln!("  Advertisements:     {}", self.advertisements);
        eprintln!("  GATT operations:    {}", self.gatt_operations);
        eprintln!("    Device frames:    {}", self.frames);
        if let Some((first, last)) = self.span_us {
            eprintln!(
                "  Capture start:      {:.6} s since Unix epoch",
                first as f64 / 1_000_000.0
            );
            eprintln!(
                "  Duration:           {:.6} s",
                (last - first) as f64 / 1_000_000.0
            );
        }
    }
}

/// btsnoop analyzer
pub struct BtsnoopAnalyzer {
    printer: Printer,
    verbose: bool,
}

impl BtsnoopAnalyzer {
    pub fn new(format: OutputFormat, filter: RecordFilter) -> Self {
        Self {
            printer: Printer::new(format, filter),
            verbose: false,
        }
    }

    /// Print record statistics after the analysis
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Write the report to `out` instead of stdout
    pub fn with_output(mut self, out: Box<dyn Write + Send>) -> Self {
        self.printer = self.printer.with_output(out);
        self
    }

    pub fn analyze_file(&self, path: &Path) -> Result<PacketStats, BtsnoopError> {
        let bytes = std::fs::read(path)?;
        let stats = self.analyze_bytes(&bytes)?;

        eprintln!(
            "\n--- Analyzed {} records, {} device frames ---",
            stats.records, stats.frames
        );
        if self.verbose {
            stats.print_summary();
        }
        Ok(stats)
    }

    /// Analyze an in-memory capture, printing each record of interest
    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<PacketStats, BtsnoopError> {
        let records = parse_capture(bytes)?;
        let mut stats = PacketStats::default();
        let Some(base) = records.first().map(|r| r.timestamp_us) else {
            return Ok(stats);
        };

        for record in &records {
            let timestamp = (record.timestamp_us - base) as f64 / 1_000_000.0;
            self.process_record(timestamp, record, &mut stats)?;
        }
        self.printer.flush()?;
        if let (Some(first), Some(last)) = (records.first(), records.last()) {
            stats.span_us = Some((first.unix_us(), last.unix_us()));
        }
        Ok(stats)
    }

    fn process_record(
        &self,
        timestamp: f64,
        record: &Record,
        stats: &mut PacketStats,
    ) -> io::Result<()> {
        stats.records += 1;
        match record.packet_type {
            hci::packet_type::COMMAND => stats.commands += 1,
            hci::packet_type::EVENT => stats.events += 1,
            hci::packet_type::ACL_DATA => stats.acl += 1,
            _ => stats.other += 1,
        }

        for decoded in decode_packet(record.packet_type, &record.data) {
            match decoded {
                HciRecord::Connection(c) => {
                    stats.connections += 1;
                    self.printer
                        .print_connection(timestamp, record.direction, &c)?;
                }
                HciRecord::Disconnection(d) => {
                    stats.disconnections += 1;
                    self.printer.print_disconnection(timestamp, &d)?;
                }
                HciRecord::Advertisement(a) => {
                    stats.advertisements += 1;
                    self.printer.print_advertisement(timestamp, &a)?;
                }
                HciRecord::Gatt(op) => {
                    stats.gatt_operations += 1;
                    if self.printer.print_gatt(timestamp, record.direction, &op)? {
                        stats.frames += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

/// CLI entry point for btsnoop analysis. The report goes to `output` when
/// given, stdout otherwise.
pub fn run_btsnoop_analysis(
    path: &Path,
    format: OutputFormat,
    filter: Option<&str>,
    verbose: bool,
    output: Option<&Path>,
) -> Result<PacketStats, BtsnoopError> {
    let filter = match filter {
        Some(f) => RecordFilter::from_str(f).map_err(BtsnoopError::Filter)?,
        None => RecordFilter::All,
    };

    let mut analyzer = BtsnoopAnalyzer::new(format, filter).with_verbose(verbose);
    if let Some(output) = output {
        let file = File::create(output)?;
        analyzer = analyzer.with_output(Box::new(BufWriter::new(file)));
    }
    let stats = analyzer.analyze_file(path)?;
    if let Some(output) = output {
        eprintln!("Report written to {}", output.display());
    }
    Ok(stats)
}
