//! Command handlers for the CLI application.
//!
//! - `device`: commands that talk to a peripheral (scan, connect + console)
//! - `frame`: offline codec commands (encode, decode, modes)
//! - `analyze`: btsnoop capture analysis

pub mod analyze;
pub mod device;
pub mod frame;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;
