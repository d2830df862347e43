//! Device commands: scan, connect + interactive console

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use crossterm::style::Stylize;
use fanlight::{BleTransport, ConsoleCommand};
use fanlight_session::{SessionConfig, SessionController, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::CommandResult;

/// Quiet period after each `--exec` command before the next one runs
const BATCH_SETTLE: Duration = Duration::from_millis(300);

async fn open_session(config: SessionConfig) -> anyhow::Result<SessionController> {
    let transport = BleTransport::new()
        .await
        .context("Failed to open Bluetooth adapter")?;
    Ok(SessionController::new(Arc::new(transport), config))
}

pub async fn scan(duration: u64) -> CommandResult {
    let mut session = open_session(SessionConfig::default()).await?;
    println!("Scanning for {duration}s...");
    let found = session.scan(Duration::from_secs(duration)).await?;

    if found.is_empty() {
        println!("No peripherals found");
        return Ok(());
    }
    println!("{:<20} {:>6}  Name", "Address", "RSSI");
    for p in found {
        let rssi = p.rssi.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
        println!("{:<20} {:>6}  {}", p.id.to_string(), rssi, p.display_name());
    }
    Ok(())
}

pub struct ConnectOptions {
    pub target: String,
    pub scan: Duration,
    pub timeout: Duration,
    pub heartbeat: Duration,
    pub exec: Vec<String>,
}

pub async fn connect(opts: ConnectOptions) -> CommandResult {
    let config = SessionConfig {
        connect_timeout: opts.timeout,
        heartbeat_period: opts.heartbeat,
        scan_duration: opts.scan,
        ..SessionConfig::default()
    };
    let mut session = open_session(config).await?;

    info!("Looking for '{}'", opts.target);
    session.scan(opts.scan).await?;
    let id = session
        .find_peripheral(&opts.target)
        .map(|p| p.id.clone())
        .ok_or_else(|| anyhow!("No peripheral matching '{}' found", opts.target))?;

    session.connect(&id).await?;
    print_selection(&session);

    let result = if opts.exec.is_empty() {
        console(&mut session).await
    } else {
        run_batch(&mut session, &opts.exec).await
    };
    if session.state().is_connected() {
        session.disconnect().await?;
    }
    result
}

fn print_selection(session: &SessionController) {
    let selection = session.selection();
    match &selection.write {
        Some(c) => println!("Write:  {} [{}]", c.uuid, c.props),
        None => println!("Write:  {}", "none (sends will fail)".yellow()),
    }
    match &selection.notify {
        Some(c) => println!("Notify: {} [{}]", c.uuid, c.props),
        None => println!("Notify: none"),
    }
}

fn print_status(session: &SessionController) {
    println!("State:     {}", session.state());
    println!("Status:    {}", session.status());
    if let Some(id) = session.connected_peripheral() {
        println!("Device:    {id}");
    }
    println!(
        "Heartbeat: {}",
        if session.heartbeat_running() { "running" } else { "stopped" }
    );
    println!("Settings:  {:?}", session.settings());
}

fn print_session_event(event: SessionEvent) {
    match event {
        SessionEvent::Notification { hex, frame } => match frame {
            Some(f) => println!(
                "{} {} (cmd 0x{:02x}, len {})",
                "RX".cyan(),
                hex,
                f.command,
                f.length
            ),
            None => println!("{} {}", "RX".cyan(), hex),
        },
        SessionEvent::StateChanged(state) => debug!("State: {}", state),
        SessionEvent::Status(_) | SessionEvent::PeripheralDiscovered(_) => {}
    }
}

fn drain_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        print_session_event(event);
    }
}

/// Execute one console line. Returns false once the operator asks to quit.
async fn run_line(session: &mut SessionController, line: &str) -> bool {
    if line.trim().is_empty() {
        return true;
    }
    let command = match line.parse::<ConsoleCommand>() {
        Ok(c) => c,
        Err(e) => {
            println!("{} {} (try 'help')", "error:".red(), e);
            return true;
        }
    };
    match command {
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Help => println!("{}", fanlight::console::HELP),
        ConsoleCommand::Status => print_status(session),
        ConsoleCommand::Log => {
            for entry in session.log() {
                println!("{entry}");
            }
        }
        other => {
            if let Err(e) = other.execute(session).await {
                println!("{} {}", "error:".red(), e);
            }
        }
    }
    true
}

async fn run_batch(session: &mut SessionController, lines: &[String]) -> CommandResult {
    let mut events = session.subscribe();
    for line in lines {
        if !run_line(session, line).await {
            break;
        }
        // Give the device a moment to answer
        while let Ok(Some(event)) = tokio::time::timeout(BATCH_SETTLE, session.next_event()).await
        {
            session.handle_event(event).await;
        }
        drain_events(&mut events);
    }
    Ok(())
}

async fn console(session: &mut SessionController) -> CommandResult {
    let mut events = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Connected. Type 'help' for commands, Ctrl-C to quit.");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !run_line(session, &line).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            event = session.next_event() => {
                match event {
                    Some(event) => session.handle_event(event).await,
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }

        drain_events(&mut events);
        if !session.state().is_connected() {
            println!("{} {}", "Disconnected:".yellow(), session.status());
            break;
        }
    }
    Ok(())
}
