// CLI definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fanlight")]
#[command(author, version, about = "BLE fan/light appliance controller")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Device Commands ===
    /// Scan for nearby peripherals
    #[command(visible_alias = "s")]
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },

    /// Connect to a peripheral and open the interactive console
    #[command(visible_alias = "c")]
    Connect {
        /// Address or name fragment of the peripheral
        target: String,

        /// Scan duration in seconds before connecting
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Connect timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,

        /// Heartbeat period in milliseconds
        #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
        heartbeat_ms: u64,

        /// Run console commands and exit instead of reading stdin (repeatable)
        #[arg(short = 'x', long = "exec", value_name = "COMMAND")]
        exec: Vec<String>,
    },

    // === Offline Commands ===
    /// Build a frame and print it as hex
    #[command(subcommand, visible_alias = "enc")]
    Encode(EncodeCommands),

    /// Parse a notification given as hex
    #[command(visible_alias = "dec")]
    Decode {
        /// Frame bytes as hex (whitespace ignored)
        hex: Vec<String>,
    },

    /// List light modes
    Modes,

    /// Analyze a btsnoop_hci.log capture
    #[command(visible_alias = "btsnoop")]
    Analyze {
        /// Capture file
        file: PathBuf,

        /// Output format
        #[arg(value_enum, short, long, default_value = "text")]
        format: AnalyzeOutputFormat,

        /// Filter (all, connections, adverts, gatt, frames)
        #[arg(long)]
        filter: Option<String>,

        /// Print record statistics
        #[arg(long)]
        stats: bool,

        /// Write the report to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Frame builders
#[derive(Subcommand)]
pub enum EncodeCommands {
    /// Heartbeat poll
    Poll,

    /// Legacy on/off control (values masked to their field widths)
    Legacy {
        enabled: u32,
        mode: u32,
        value1: u32,
        value2: u32,
        #[arg(default_value = "255")]
        flags: u32,
    },

    /// Raw multi-field control
    Raw {
        /// 0 or 1
        #[arg(value_parser = clap::value_parser!(u8).range(0..2))]
        enabled: u8,
        mode: u8,
        sub_mode: u8,
        param: u8,
        value1: u16,
        value2: u32,
    },

    /// Light control
    Light {
        /// Light mode name or code (see `modes`)
        mode: String,

        /// Intensity percent
        #[arg(short, long, default_value = "50")]
        intensity: u32,

        /// Daylight in Kelvin
        #[arg(short, long, default_value = "3200")]
        kelvin: u32,

        /// Effect frequency (1-10)
        #[arg(short, long, default_value = "5")]
        frequency: u8,

        /// Encode the light as switched off
        #[arg(long)]
        off: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
pub enum AnalyzeOutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output (one object per line)
    Json,
}
