//! fanlight CLI
//!
//! Scan for and drive BLE fan/light appliances, build and decode frames
//! offline, and analyze btsnoop captures.

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;
use commands::device::ConnectOptions;

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("fanlight={level}").parse()?)
        .add_directive(format!("fanlight_session={level}").parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        // === Device Commands ===
        Commands::Scan { duration } => {
            commands::device::scan(duration).await?;
        }
        Commands::Connect {
            target,
            duration,
            timeout,
            heartbeat_ms,
            exec,
        } => {
            commands::device::connect(ConnectOptions {
                target,
                scan: Duration::from_secs(duration),
                timeout: Duration::from_secs(timeout),
                heartbeat: Duration::from_millis(heartbeat_ms),
                exec,
            })
            .await?;
        }

        // === Offline Commands ===
        Commands::Encode(command) => {
            commands::frame::encode(command)?;
        }
        Commands::Decode { hex } => {
            commands::frame::decode(&hex)?;
        }
        Commands::Modes => {
            commands::frame::modes()?;
        }
        Commands::Analyze {
            file,
            format,
            filter,
            stats,
            output,
        } => {
            commands::analyze::analyze(
                &file,
                format,
                filter.as_deref(),
                stats,
                output.as_deref(),
            )?;
        }
    }

    Ok(())
}
