// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Constants for the ITG-3200 gyroscope driver.
//!
//! This module contains the bus address, the register map, the fixed
//! configuration bytes written at startup and the polling cadence.

use std::time::Duration;

use crate::interface::BusSpeed;

/// 7-bit I2C address of the ITG-3200 (AD0 pulled low)
pub const GYRO_I2C_ADDR: u16 = 0x68;

/// Bus speed the device is driven at
pub const GYRO_BUS_SPEED: BusSpeed = BusSpeed::Fast;

// =============================================================================
// Register Map
// =============================================================================

/// Digital low-pass filter / full-scale register
pub const GYRO_REG_DLPF: u8 = 0x16;
/// Power management register
pub const GYRO_REG_POWER: u8 = 0x3E;
/// X axis high data register
pub const GYRO_REG_X: u8 = 0x1D;
/// Y axis high data register
pub const GYRO_REG_Y: u8 = 0x1F;
/// Z axis high data register
pub const GYRO_REG_Z: u8 = 0x21;

/// Bytes returned by one burst read starting at [`GYRO_REG_X`]:
/// X msb, X lsb, Y msb, Y lsb, Z msb, Z lsb
pub const GYRO_DATA_LEN: usize = 6;

// =============================================================================
// Configuration Values
// =============================================================================

/// Powered on, clock source PLL with X gyro reference
pub const GYRO_POWER_PLL_X: u8 = 0x01;
/// Full scale +/-2000 deg/s, 256 Hz low-pass bandwidth, 8 Hz internal sample rate
pub const GYRO_DLPF_FS_2000_BW_256: u8 = 0x18;

// =============================================================================
// Polling
// =============================================================================

/// Period between two sensor reads
pub const POLL_PERIOD: Duration = Duration::from_millis(500);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_7_bit() {
        assert!(GYRO_I2C_ADDR <= 0x7F);
    }

    #[test]
    fn test_axis_registers_are_contiguous() {
        // Each axis occupies a high/low pair, so the burst read walks
        // X, Y, Z without gaps.
        assert_eq!(GYRO_REG_Y, GYRO_REG_X + 2);
        assert_eq!(GYRO_REG_Z, GYRO_REG_Y + 2);
        assert_eq!(
            GYRO_DATA_LEN,
            (GYRO_REG_Z - GYRO_REG_X) as usize + 2,
            "burst length must cover all three axes"
        );
    }

    #[test]
    fn test_configuration_registers() {
        let registers = [GYRO_REG_DLPF, GYRO_REG_POWER, GYRO_REG_X, GYRO_REG_Y, GYRO_REG_Z];
        for (i, &reg1) in registers.iter().enumerate() {
            for &reg2 in registers.iter().skip(i + 1) {
                assert_ne!(reg1, reg2, "Duplicate register found: 0x{:02X}", reg1);
            }
        }

        assert_eq!(GYRO_POWER_PLL_X, 0x01);
        // FS_SEL = 3 in bits 4:3, DLPF_CFG = 0
        assert_eq!((GYRO_DLPF_FS_2000_BW_256 >> 3) & 0x03, 0x03);
        assert_eq!(GYRO_DLPF_FS_2000_BW_256 & 0x07, 0x00);
    }

    #[test]
    fn test_poll_period() {
        assert_eq!(POLL_PERIOD.as_millis(), 500);
    }
}
