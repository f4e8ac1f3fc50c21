//! Offset-256 signed byte helpers
//!
//! The device transmits signed values (RSSI thresholds, readings, time offsets)
//! as a single byte where values above 127 stand for `raw - 256`.

use crate::core::{Error, Result};

/// Recovers a signed value from its raw byte
pub fn decode_signed(raw: u8) -> i16 {
    let value = i16::from(raw);
    if value > 127 {
        value - 256
    } else {
        value
    }
}

/// Encodes a signed value into one byte, rejecting anything outside -128..=127
pub fn encode_signed(value: i16, field: &str) -> Result<u8> {
    if !(-128..=127).contains(&value) {
        return Err(Error::unsupported(format!(
            "{} must be within -128..=127, got {}",
            field, value
        )));
    }
    let raw = if value < 0 { value + 256 } else { value };
    Ok(raw as u8)
}
