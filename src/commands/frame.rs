//! Offline frame commands: encode, decode, modes

use anyhow::{anyhow, bail};
use crossterm::style::Stylize;
use fanlight_protocol::protocol::{cmd, PAYLOAD_OFFSET, TRAILER};
use fanlight_protocol::{
    build_legacy_control, build_light_control, build_poll, build_raw_control, from_hex,
    parse_notification, Frame, LightMode,
};

use super::CommandResult;
use crate::cli::EncodeCommands;

/// Accept a mode label (`bad-bulb`) or its numeric code (`0x03`, `3`)
fn parse_light_mode(s: &str) -> anyhow::Result<LightMode> {
    if let Ok(mode) = s.parse::<LightMode>() {
        return Ok(mode);
    }
    let code = match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => s.parse::<u8>().ok(),
    };
    code.and_then(LightMode::from_u8)
        .ok_or_else(|| anyhow!("Unknown light mode '{s}' (see `fanlight modes`)"))
}

fn print_frame(label: &str, frame: &Frame) {
    println!("{} {}", format!("{label}:").bold(), frame.to_hex().green());
}

pub fn encode(command: EncodeCommands) -> CommandResult {
    match command {
        EncodeCommands::Poll => print_frame("Poll", &build_poll()),
        EncodeCommands::Legacy {
            enabled,
            mode,
            value1,
            value2,
            flags,
        } => print_frame(
            "Legacy control",
            &build_legacy_control(enabled, mode, value1, value2, flags),
        ),
        EncodeCommands::Raw {
            enabled,
            mode,
            sub_mode,
            param,
            value1,
            value2,
        } => print_frame(
            "Raw control",
            &build_raw_control(enabled == 1, mode, sub_mode, param, value1, value2),
        ),
        EncodeCommands::Light {
            mode,
            intensity,
            kelvin,
            frequency,
            off,
        } => {
            let mode = parse_light_mode(&mode)?;
            let frame = build_light_control(!off, mode, intensity, kelvin, frequency);
            print_frame(&format!("Light control ({mode})"), &frame);
        }
    }
    Ok(())
}

pub fn decode(parts: &[String]) -> CommandResult {
    let compact: String = parts.concat().chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = from_hex(&compact)?;
    let Some(frame) = parse_notification(&bytes) else {
        bail!("Not a device frame (need at least 6 bytes starting with 20 00)");
    };

    println!(
        "Command:  0x{:02x} ({})",
        frame.command,
        cmd::name(frame.command)
    );
    println!("Length:   {}", frame.length);
    println!("Payload:  {}", frame.payload_hex());
    if frame.is_truncated() {
        println!(
            "          {}",
            format!(
                "truncated: {} of {} bytes",
                frame.payload.len(),
                frame.length
            )
            .yellow()
        );
        return Ok(());
    }

    let checksum = if frame.checksum_matches(&bytes) {
        "ok".green()
    } else {
        "MISMATCH".red()
    };
    println!("Checksum: {checksum}");

    let trailer_at = PAYLOAD_OFFSET + frame.length as usize + 2;
    let trailer = match bytes.get(trailer_at..trailer_at + 2) {
        Some(t) if t == TRAILER.as_slice() => "ok".green(),
        Some(_) => "unexpected".yellow(),
        None => "missing".yellow(),
    };
    println!("Trailer:  {trailer}");
    Ok(())
}

pub fn modes() -> CommandResult {
    println!("{:<6} {:<16} {:<8} Daylight", "Code", "Mode", "Tag");
    for mode in LightMode::ALL {
        println!(
            "0x{:02x}   {:<16} 0x{:02x}     {}",
            mode.code(),
            mode.label(),
            mode.type_tag(),
            if mode.has_daylight() { "yes" } else { "no" }
        );
    }
    Ok(())
}
