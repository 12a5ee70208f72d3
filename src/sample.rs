// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Sample decoding for the ITG-3200 driver.
//!
//! The gyro reports each axis as a big-endian two's-complement 16-bit word.
//! This module turns the six bytes of one burst read into a [`RawSample`]
//! and defines the events handed to consumers.

use std::fmt;

use crate::{constants::GYRO_DATA_LEN, driver::FatalError};

/// One angular-rate reading in raw counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawSample {
    /// Decode a burst read of the X, Y and Z data registers
    pub fn from_bytes(buf: &[u8; GYRO_DATA_LEN]) -> Self {
        Self {
            x: decode_word(buf[0], buf[1]),
            y: decode_word(buf[2], buf[3]),
            z: decode_word(buf[4], buf[5]),
        }
    }

    /// Axes as `[x, y, z]`
    pub fn axes(&self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }
}

impl fmt::Display for RawSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X Axis: {}, Y Axis: {}, Z Axis: {}", self.x, self.y, self.z)
    }
}

/// Reinterpret an unsigned 16-bit register value as two's complement
pub fn decode_raw(raw: u16) -> i16 {
    let mut value = raw as i32;
    if value > i16::MAX as i32 {
        value -= 0x1_0000;
    }
    value as i16
}

/// Concatenate a high and low register byte and decode the result
pub fn decode_word(high: u8, low: u8) -> i16 {
    decode_raw(u16::from(high) << 8 | u16::from(low))
}

/// Notification produced by the polling runtime
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// A new reading was decoded
    Sample(RawSample),
    /// A poll transaction failed; polling continues
    Fault(String),
    /// Initialization failed; polling never starts
    Fatal(FatalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_raw_ranges() {
        assert_eq!(decode_raw(0), 0);
        assert_eq!(decode_raw(32767), 32767);
        assert_eq!(decode_raw(32768), -32768);
        assert_eq!(decode_raw(65535), -1);
    }

    #[test]
    fn test_decode_raw_is_bijective() {
        let mut seen = vec![false; 1 << 16];
        for raw in 0..=u16::MAX {
            let value = decode_raw(raw);
            let expected = if raw <= 32767 {
                raw as i32
            } else {
                raw as i32 - 65536
            };
            assert_eq!(value as i32, expected);

            let slot = (value as i32 + 32768) as usize;
            assert!(!seen[slot], "value {} produced twice", value);
            seen[slot] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_decode_word_vectors() {
        assert_eq!(decode_word(0x00, 0x00), 0);
        assert_eq!(decode_word(0x7F, 0xFF), 32767);
        assert_eq!(decode_word(0x80, 0x00), -32768);
        assert_eq!(decode_word(0xFF, 0xFF), -1);
        assert_eq!(decode_word(0x01, 0x00), 256);
    }

    #[test]
    fn test_decode_word_matches_concatenation() {
        for (high, low) in [(0x12, 0x34), (0xAB, 0xCD), (0x00, 0xFF), (0xFF, 0x00)] {
            assert_eq!(
                decode_word(high, low),
                decode_raw((high as u16) << 8 | low as u16)
            );
        }
    }

    #[test]
    fn test_sample_from_bytes() {
        let sample = RawSample::from_bytes(&[0x00, 0x0A, 0xFF, 0xF6, 0x00, 0x00]);
        assert_eq!(sample, RawSample { x: 10, y: -10, z: 0 });
        assert_eq!(sample.axes(), [10, -10, 0]);
    }

    #[test]
    fn test_sample_display() {
        let sample = RawSample { x: 1, y: -2, z: 300 };
        assert_eq!(sample.to_string(), "X Axis: 1, Y Axis: -2, Z Axis: 300");
    }
}
