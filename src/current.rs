//! Conversion between physical RMS motor current and the chip's internal
//! current scale
//!
//! The chips regulate current against the voltage across the external sense
//! resistors, with two selectable full-scale ranges (VSENSE). The scale has
//! 32 steps; step `cs` targets
//! `I_rms = (cs + 1) / 32 * V_fs / (R_sense + 0.02) / sqrt(2)`.
//! The 20 mΩ term accounts for the chip's internal slope resistance.

/// Full-scale sense voltage with VSENSE = 0 (low sensitivity)
const V_FS_LOW: f32 = 0.325;

/// Full-scale sense voltage with VSENSE = 1 (high sensitivity)
const V_FS_HIGH: f32 = 0.180;

const SQRT_2: f32 = 1.414_213_5;

fn full_scale(vsense_high: bool) -> f32 {
    if vsense_high {
        V_FS_HIGH
    } else {
        V_FS_LOW
    }
}

/// Current scale step (0..=31) that best approximates `milliamps` RMS
pub(crate) fn scale_for_rms(milliamps: u16, rsense_ohms: f32, vsense_high: bool) -> u8 {
    let amps = milliamps as f32 / 1000.0;
    let scale = 32.0 * SQRT_2 * amps * (rsense_ohms + 0.02) / full_scale(vsense_high) - 1.0;
    if scale < 0.0 {
        0
    } else if scale > 31.0 {
        31
    } else {
        scale as u8
    }
}

/// RMS current in milliamps that current scale step `scale` regulates to
pub(crate) fn rms_from_scale(scale: u8, rsense_ohms: f32, vsense_high: bool) -> u16 {
    let amps =
        (scale as f32 + 1.0) / 32.0 * full_scale(vsense_high) / (rsense_ohms + 0.02) / SQRT_2;
    (amps * 1000.0) as u16
}
