//! Line-oriented operator commands for a connected session

use std::fmt;
use std::str::FromStr;

use fanlight_protocol::LightMode;
use fanlight_session::{SessionController, SessionError};

/// One operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Power(bool),
    Fan(bool),
    Light(bool),
    Speed(u32),
    Brightness(u32),
    White(u32),
    Effect(LightMode, Option<u8>),
    Raw(String),
    Poll,
    Status,
    Log,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleParseError(String);

impl fmt::Display for ConsoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConsoleParseError {}

pub const HELP: &str = "\
Commands:
  on | off               power toggle (fan + light)
  fan on|off             fan only
  light on|off           light only
  speed <0-100>          fan speed percent
  brightness <0-100>     light intensity percent
  white <2700-6500>      static white at the given Kelvin
  effect <name> [1-10]   light effect, optional frequency
  raw <hex>              send bytes verbatim
  poll                   send a heartbeat poll
  status | log | help | quit";

fn parse_switch(arg: Option<&str>) -> Result<bool, ConsoleParseError> {
    match arg.map(str::to_ascii_lowercase).as_deref() {
        Some("on" | "1" | "true") => Ok(true),
        Some("off" | "0" | "false") => Ok(false),
        Some(other) => Err(ConsoleParseError(format!("expected on/off, got '{other}'"))),
        None => Err(ConsoleParseError("expected on/off".into())),
    }
}

fn parse_number<T: FromStr>(arg: Option<&str>, what: &str) -> Result<T, ConsoleParseError> {
    let arg = arg.ok_or_else(|| ConsoleParseError(format!("missing {what}")))?;
    arg.parse()
        .map_err(|_| ConsoleParseError(format!("invalid {what} '{arg}'")))
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let mut args = rest.split_whitespace();

        match word.to_ascii_lowercase().as_str() {
            "on" => Ok(Self::Power(true)),
            "off" => Ok(Self::Power(false)),
            "power" => parse_switch(args.next()).map(Self::Power),
            "fan" => parse_switch(args.next()).map(Self::Fan),
            "light" => parse_switch(args.next()).map(Self::Light),
            "speed" => parse_number(args.next(), "speed").map(Self::Speed),
            "brightness" | "bri" => parse_number(args.next(), "brightness").map(Self::Brightness),
            "white" => parse_number(args.next(), "kelvin").map(Self::White),
            "effect" => {
                let name = args
                    .next()
                    .ok_or_else(|| ConsoleParseError("missing effect name".into()))?;
                let mode = name
                    .parse::<LightMode>()
                    .map_err(|e| ConsoleParseError(e.to_string()))?;
                let frequency = match args.next() {
                    Some(f) => Some(parse_number(Some(f), "frequency")?),
                    None => None,
                };
                Ok(Self::Effect(mode, frequency))
            }
            "raw" if !rest.is_empty() => Ok(Self::Raw(rest.to_string())),
            "raw" => Err(ConsoleParseError("missing hex".into())),
            "poll" => Ok(Self::Poll),
            "status" => Ok(Self::Status),
            "log" => Ok(Self::Log),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            "" => Err(ConsoleParseError("empty command".into())),
            other => Err(ConsoleParseError(format!("unknown command '{other}'"))),
        }
    }
}

impl ConsoleCommand {
    /// Run a device command. Local commands (status, log, help, quit) are no-ops here.
    pub async fn execute(&self, session: &mut SessionController) -> Result<(), SessionError> {
        match self {
            Self::Power(on) => session.set_power(*on).await,
            Self::Fan(on) => session.set_fan(*on).await,
            Self::Light(on) => session.set_light(*on).await,
            Self::Speed(p) => session.set_speed(*p).await,
            Self::Brightness(p) => session.set_brightness(*p).await,
            Self::White(k) => session.set_white(*k).await,
            Self::Effect(mode, frequency) => session.set_effect(*mode, *frequency).await,
            Self::Raw(hex) => session.send_raw_hex(hex).await,
            Self::Poll => session.send_poll().await,
            Self::Status | Self::Log | Self::Help | Self::Quit => Ok(()),
        }
    }
}
