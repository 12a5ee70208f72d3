// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Two-wire bus abstraction used by the driver.
//!
//! A [`BusController`] stands for the host's bus enumeration and address
//! ownership service. Opening a device yields a [`BusSession`], which owns
//! the address until it is closed.

pub mod linux;
pub mod mock;

use std::fmt;

use thiserror::Error;

/// I2C clock speed requested when opening a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusSpeed {
    /// 100 kHz
    Standard,
    /// 400 kHz
    Fast,
}

impl BusSpeed {
    /// Clock frequency in Hz
    pub fn frequency_hz(&self) -> u32 {
        match self {
            BusSpeed::Standard => 100_000,
            BusSpeed::Fast => 400_000,
        }
    }
}

impl fmt::Display for BusSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusSpeed::Standard => write!(f, "standard mode"),
            BusSpeed::Fast => write!(f, "fast mode"),
        }
    }
}

/// Transport-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Enumeration returned no controllers
    #[error("no I2C controllers were found on the system")]
    NoControllerFound,

    /// Another owner already holds the address
    #[error("slave address 0x{address:02X} on I2C controller {controller} is currently in use")]
    AddressInUse { controller: String, address: u16 },

    /// The controller could not be opened for another reason
    #[error("failed to open slave address 0x{address:02X} on I2C controller {controller}: {detail}")]
    Open {
        controller: String,
        address: u16,
        detail: String,
    },

    /// Enumeration itself failed
    #[error("I2C controller discovery failed: {0}")]
    Discovery(String),

    /// A register write did not complete
    #[error("bus write failed: {0}")]
    Write(String),

    /// A combined write-read did not complete
    #[error("bus transaction failed: {0}")]
    Transaction(String),
}

/// Host service that enumerates controllers and hands out device sessions
pub trait BusController {
    type Session: BusSession;

    /// List the identifiers of the available bus controllers
    fn discover(&self) -> Result<Vec<String>, BusError>;

    /// Take exclusive ownership of `address` on `controller`
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AddressInUse`] if the address is already owned.
    fn open(
        &self,
        controller: &str,
        address: u16,
        speed: BusSpeed,
    ) -> Result<Self::Session, BusError>;
}

/// An open device on the bus
pub trait BusSession: Send {
    /// Write `value` to `register` as one two-byte transaction
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError>;

    /// Write `write_data`, then fill `read_buffer` without releasing the bus
    fn write_read(&mut self, write_data: &[u8], read_buffer: &mut [u8]) -> Result<(), BusError>;

    /// Controller this session was opened on
    fn controller(&self) -> &str;

    /// Device address this session owns
    fn address(&self) -> u16;

    /// Release the address. Consumes the session so it cannot be reused.
    fn close(self)
    where
        Self: Sized;
}
