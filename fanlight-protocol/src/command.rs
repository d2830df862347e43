//! Type-safe command builders
//!
//! Each command type knows its command byte and how to lay out its data
//! bytes. The envelope (header, length, device id, checksum, trailer) is
//! added by [`FrameCommand::build`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use zerocopy::byteorder::{big_endian, little_endian};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::mapping;
use crate::protocol::{self, checksum_base, CommandType, Frame};

// =============================================================================
// Core Trait
// =============================================================================

/// A command that can be serialized to a wire frame
pub trait FrameCommand {
    /// Command type carried at offset 4
    const COMMAND: CommandType;

    /// Serialize to data bytes (excluding the device id)
    fn data(&self) -> Vec<u8>;

    /// Build the complete frame
    fn build(&self) -> Frame {
        protocol::build_frame(Self::COMMAND, &protocol::with_device_id(&self.data()))
    }
}

// =============================================================================
// Light modes
// =============================================================================

/// Light type tag for static white
pub const LIGHT_TAG_STATIC: u8 = 0x00;
/// Light type tag for animated effects
pub const LIGHT_TAG_EFFECT: u8 = 0x02;

/// Light effect selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum LightMode {
    #[default]
    White = 0xFF,
    Candle = 0x01,
    Pulse = 0x02,
    CctLoop = 0x03,
    Flush = 0x04,
    Lightning = 0x05,
    Tv = 0x06,
    Paparazzi = 0x07,
    Breathing = 0x08,
    Fireworks = 0x09,
    Blast = 0x0A,
    BadBulb = 0x0B,
    Welding = 0x0C,
}

impl LightMode {
    pub const ALL: [LightMode; 13] = [
        Self::White,
        Self::Candle,
        Self::Pulse,
        Self::CctLoop,
        Self::Flush,
        Self::Lightning,
        Self::Tv,
        Self::Paparazzi,
        Self::Breathing,
        Self::Fireworks,
        Self::Blast,
        Self::BadBulb,
        Self::Welding,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == v)
    }

    /// Effect code on the wire
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Candle => "candle",
            Self::Pulse => "pulse",
            Self::CctLoop => "cct-loop",
            Self::Flush => "flush",
            Self::Lightning => "lightning",
            Self::Tv => "tv",
            Self::Paparazzi => "paparazzi",
            Self::Breathing => "breathing",
            Self::Fireworks => "fireworks",
            Self::Blast => "blast",
            Self::BadBulb => "bad-bulb",
            Self::Welding => "welding",
        }
    }

    /// Whether the effect honours the daylight parameter
    pub fn has_daylight(self) -> bool {
        !matches!(self, Self::CctLoop | Self::Fireworks)
    }

    /// Static white is the only non-animated mode
    pub fn is_static(self) -> bool {
        self == Self::White
    }

    /// Type tag written after the enabled byte
    pub fn type_tag(self) -> u8 {
        if self.is_static() {
            LIGHT_TAG_STATIC
        } else {
            LIGHT_TAG_EFFECT
        }
    }
}

impl fmt::Display for LightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unknown light mode name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLightMode(pub String);

impl fmt::Display for UnknownLightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown light mode '{}'", self.0)
    }
}

impl std::error::Error for UnknownLightMode {}

impl FromStr for LightMode {
    type Err = UnknownLightMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        let compact = wanted.replace('-', "");
        Self::ALL
            .into_iter()
            .find(|m| m.label() == wanted || m.label().replace('-', "") == compact)
            .ok_or_else(|| UnknownLightMode(s.to_string()))
    }
}

// =============================================================================
// Poll
// =============================================================================

/// Heartbeat poll, no data beyond the device id
#[derive(Debug, Clone, Copy, Default)]
pub struct Poll;

impl FrameCommand for Poll {
    const COMMAND: CommandType = CommandType::Poll;

    fn data(&self) -> Vec<u8> {
        vec![]
    }
}

// =============================================================================
// Control payloads (zerocopy)
// =============================================================================

/// Reserved padding byte
const PAD: u8 = 0xFF;

/// Default legacy flag byte
pub const LEGACY_FLAGS_DEFAULT: u8 = 0xFF;

/// Legacy on/off control: 11 data bytes, no base byte.
///
/// Values are little-endian; the tail is four reserved `0xFF` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LegacyControl {
    enabled: u8,
    mode: u8,
    value1: little_endian::U16,
    value2: little_endian::U16,
    flags: u8,
    _reserved: [u8; 4],
}

impl LegacyControl {
    pub fn new(enabled: bool, mode: u8, value1: u16, value2: u16, flags: u8) -> Self {
        Self::from_fields(u8::from(enabled), mode, value1, value2, flags)
    }

    /// Accept wide inputs and truncate each to its field width.
    ///
    /// `enabled` is a full byte on the wire, so `2` stays `0x02`.
    pub fn masked(enabled: u32, mode: u32, value1: u32, value2: u32, flags: u32) -> Self {
        Self::from_fields(
            (enabled & 0xFF) as u8,
            (mode & 0xFF) as u8,
            (value1 & 0xFFFF) as u16,
            (value2 & 0xFFFF) as u16,
            (flags & 0xFF) as u8,
        )
    }

    fn from_fields(enabled: u8, mode: u8, value1: u16, value2: u16, flags: u8) -> Self {
        Self {
            enabled,
            mode,
            value1: little_endian::U16::new(value1),
            value2: little_endian::U16::new(value2),
            flags,
            _reserved: [PAD; 4],
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled != 0
    }

    /// Enabled byte as sent
    pub fn enabled_byte(&self) -> u8 {
        self.enabled
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    pub fn value1(&self) -> u16 {
        self.value1.get()
    }

    pub fn value2(&self) -> u16 {
        self.value2.get()
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }
}

impl FrameCommand for LegacyControl {
    const COMMAND: CommandType = CommandType::Control;

    fn data(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// Raw multi-field control: ten big-endian-packed bytes plus the base byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawControl {
    enabled: u8,
    mode: u8,
    sub_mode: u8,
    param: u8,
    value1: big_endian::U16,
    value2: big_endian::U32,
    base: u8,
}

impl RawControl {
    pub fn new(enabled: bool, mode: u8, sub_mode: u8, param: u8, value1: u16, value2: u32) -> Self {
        Self {
            enabled: u8::from(enabled),
            mode,
            sub_mode,
            param,
            value1: big_endian::U16::new(value1),
            value2: big_endian::U32::new(value2),
            base: checksum_base::CONTROL,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled != 0
    }

    /// Enabled byte as sent
    pub fn enabled_byte(&self) -> u8 {
        self.enabled
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    pub fn sub_mode(&self) -> u8 {
        self.sub_mode
    }

    pub fn param(&self) -> u8 {
        self.param
    }

    pub fn value1(&self) -> u16 {
        self.value1.get()
    }

    pub fn value2(&self) -> u32 {
        self.value2.get()
    }
}

impl FrameCommand for RawControl {
    const COMMAND: CommandType = CommandType::Control;

    fn data(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// Light control wire layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct LightControlData {
    enabled: u8,
    tag: u8,
    effect: u8,
    intensity: u8,
    daylight: little_endian::U16,
    _pad: [u8; 3],
    frequency: u8,
    base: u8,
}

/// Light control in operator units (percent, Kelvin)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightControl {
    pub enabled: bool,
    pub mode: LightMode,
    pub intensity: u32,
    pub kelvin: u32,
    pub frequency: u8,
}

impl LightControl {
    pub fn new(enabled: bool, mode: LightMode, intensity: u32, kelvin: u32) -> Self {
        Self {
            enabled,
            mode,
            intensity,
            kelvin,
            frequency: mapping::DEFAULT_FREQUENCY,
        }
    }

    pub fn frequency(mut self, frequency: u8) -> Self {
        self.frequency = frequency;
        self
    }

    /// Daylight device value, substituting neutral for effects without daylight
    pub fn daylight(&self) -> u16 {
        let kelvin = if self.mode.has_daylight() {
            self.kelvin
        } else {
            u32::from(mapping::NEUTRAL_KELVIN)
        };
        mapping::kelvin_to_daylight(kelvin)
    }
}

impl FrameCommand for LightControl {
    const COMMAND: CommandType = CommandType::Control;

    fn data(&self) -> Vec<u8> {
        // Static white carries 0xFF in the frequency slot
        let frequency = if self.mode.is_static() {
            PAD
        } else {
            mapping::clamp_frequency(self.frequency)
        };
        LightControlData {
            enabled: u8::from(self.enabled),
            tag: self.mode.type_tag(),
            effect: self.mode.code(),
            intensity: mapping::intensity_percent(self.intensity),
            daylight: little_endian::U16::new(self.daylight()),
            _pad: [PAD; 3],
            frequency,
            base: checksum_base::CONTROL,
        }
        .as_bytes()
        .to_vec()
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn build_poll() -> Frame {
    Poll.build()
}

/// Legacy on/off frame; inputs are masked to their field widths
pub fn build_legacy_control(enabled: u32, mode: u32, value1: u32, value2: u32, flags: u32) -> Frame {
    LegacyControl::masked(enabled, mode, value1, value2, flags).build()
}

pub fn build_raw_control(
    enabled: bool,
    mode: u8,
    sub_mode: u8,
    param: u8,
    value1: u16,
    value2: u32,
) -> Frame {
    RawControl::new(enabled, mode, sub_mode, param, value1, value2).build()
}

pub fn build_light_control(
    enabled: bool,
    mode: LightMode,
    intensity: u32,
    kelvin: u32,
    frequency: u8,
) -> Frame {
    LightControl::new(enabled, mode, intensity, kelvin)
        .frequency(frequency)
        .build()
}
