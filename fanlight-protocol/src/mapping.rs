//! Physical-unit conversions for control parameters
//!
//! Operator-facing values (Kelvin, percent) are clamped to their domain and
//! then mapped linearly onto the device's 16-bit code range.

/// Lowest daylight temperature the device accepts (K)
pub const KELVIN_MIN: u16 = 2700;
/// Highest daylight temperature the device accepts (K)
pub const KELVIN_MAX: u16 = 6500;
/// Daylight substituted for effects that ignore the daylight parameter (K)
pub const NEUTRAL_KELVIN: u16 = 4600;

/// Device code for [`KELVIN_MIN`]
pub const DAYLIGHT_MIN: u16 = 0x0A8C;
/// Device code for [`KELVIN_MAX`]
pub const DAYLIGHT_MAX: u16 = 0x1964;

/// Fan speed device code at 0%
pub const SPEED_MIN: u16 = 0x0C80;
/// Fan speed device code at 100% (raw control path)
pub const SPEED_MAX: u16 = 0x1964;
/// Fan speed device code at 100% on the legacy on/off path.
///
/// Differs from [`SPEED_MAX`] although both paths drive the same fan. Kept
/// as-is until one of the two is confirmed against hardware.
pub const LEGACY_SPEED_MAX: u16 = 0x1815;

/// Upper bound for percent inputs
pub const PERCENT_MAX: u8 = 100;

/// Effect frequency bounds
pub const FREQUENCY_MIN: u8 = 1;
pub const FREQUENCY_MAX: u8 = 10;
pub const DEFAULT_FREQUENCY: u8 = 5;

/// Linear map of `value` from `[in_lo, in_hi]` onto `[out_lo, out_hi]`, rounded.
///
/// `value` is clamped to the input domain first.
fn affine(value: u32, in_lo: u32, in_hi: u32, out_lo: u16, out_hi: u16) -> u16 {
    let v = value.clamp(in_lo, in_hi);
    let span_in = f64::from(in_hi - in_lo);
    let span_out = f64::from(out_hi) - f64::from(out_lo);
    let mapped = f64::from(out_lo) + f64::from(v - in_lo) * span_out / span_in;
    mapped.round() as u16
}

/// Convert a daylight temperature in Kelvin to the device code
pub fn kelvin_to_daylight(kelvin: u32) -> u16 {
    affine(
        kelvin,
        u32::from(KELVIN_MIN),
        u32::from(KELVIN_MAX),
        DAYLIGHT_MIN,
        DAYLIGHT_MAX,
    )
}

/// Clamp an intensity/brightness percent (identity mapping)
pub fn intensity_percent(percent: u32) -> u8 {
    percent.min(u32::from(PERCENT_MAX)) as u8
}

/// Convert a fan speed percent to the device code (raw control range)
pub fn speed_percent_to_value(percent: u32) -> u16 {
    affine(percent, 0, u32::from(PERCENT_MAX), SPEED_MIN, SPEED_MAX)
}

/// Convert a fan speed percent to the device code (legacy on/off range)
pub fn legacy_speed_percent_to_value(percent: u32) -> u16 {
    affine(percent, 0, u32::from(PERCENT_MAX), SPEED_MIN, LEGACY_SPEED_MAX)
}

/// Clamp an effect frequency into `[FREQUENCY_MIN, FREQUENCY_MAX]`
pub fn clamp_frequency(frequency: u8) -> u8 {
    frequency.clamp(FREQUENCY_MIN, FREQUENCY_MAX)
}
