// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Linux `/dev/i2c-N` backend built on the `i2cdev` crate.

use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use i2cdev::{
    core::{I2CDevice, I2CMessage, I2CTransfer},
    linux::{LinuxI2CDevice, LinuxI2CError, LinuxI2CMessage},
};
use log::{debug, trace, warn};

use super::{BusController, BusError, BusSession, BusSpeed};

const DEFAULT_DEV_DIR: &str = "/dev";
const CONTROLLER_PREFIX: &str = "i2c-";
const EBUSY: i32 = 16;

/// Addresses held by sessions in this process, keyed by controller path
static OWNED_ADDRESSES: Mutex<BTreeSet<(String, u16)>> = Mutex::new(BTreeSet::new());

fn io_detail(err: LinuxI2CError) -> io::Error {
    io::Error::from(err)
}

/// Enumerates the I2C character devices exposed by the kernel
#[derive(Debug, Clone)]
pub struct LinuxI2cBus {
    dev_dir: PathBuf,
}

impl Default for LinuxI2cBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxI2cBus {
    pub fn new() -> Self {
        Self::with_dev_dir(DEFAULT_DEV_DIR)
    }

    /// Look for controllers in a directory other than `/dev`
    pub fn with_dev_dir<P: AsRef<Path>>(dev_dir: P) -> Self {
        Self {
            dev_dir: dev_dir.as_ref().to_path_buf(),
        }
    }
}

impl BusController for LinuxI2cBus {
    type Session = LinuxI2cSession;

    fn discover(&self) -> Result<Vec<String>, BusError> {
        let entries =
            fs::read_dir(&self.dev_dir).map_err(|e| BusError::Discovery(e.to_string()))?;

        let mut controllers: Vec<(u32, String)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BusError::Discovery(e.to_string()))?;
            let name = entry.file_name();
            let Some(bus_num) = name
                .to_str()
                .and_then(|n| n.strip_prefix(CONTROLLER_PREFIX))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            trace!("--- {} ---", entry.path().display());
            controllers.push((bus_num, entry.path().display().to_string()));
        }
        controllers.sort();

        debug!("found {} I2C controllers", controllers.len());
        Ok(controllers.into_iter().map(|(_, path)| path).collect())
    }

    fn open(
        &self,
        controller: &str,
        address: u16,
        speed: BusSpeed,
    ) -> Result<LinuxI2cSession, BusError> {
        let key = (controller.to_string(), address);
        {
            let mut owned = OWNED_ADDRESSES
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !owned.insert(key.clone()) {
                return Err(BusError::AddressInUse {
                    controller: controller.to_string(),
                    address,
                });
            }
        }

        let device = match LinuxI2CDevice::new(controller, address) {
            Ok(device) => device,
            Err(e) => {
                OWNED_ADDRESSES
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key);
                let e = io_detail(e);
                if e.raw_os_error() == Some(EBUSY) {
                    return Err(BusError::AddressInUse {
                        controller: controller.to_string(),
                        address,
                    });
                }
                return Err(BusError::Open {
                    controller: controller.to_string(),
                    address,
                    detail: e.to_string(),
                });
            }
        };

        // The clock rate of a Linux adapter is fixed by its device tree or
        // module parameters; userspace can only record what it asked for.
        debug!(
            "opened 0x{:02X} on {} ({}, {} Hz requested)",
            address,
            controller,
            speed,
            speed.frequency_hz()
        );

        Ok(LinuxI2cSession {
            device,
            controller: controller.to_string(),
            address,
            speed,
        })
    }
}

/// A device opened through [`LinuxI2cBus`]
pub struct LinuxI2cSession {
    device: LinuxI2CDevice,
    controller: String,
    address: u16,
    speed: BusSpeed,
}

impl LinuxI2cSession {
    /// Speed requested when the session was opened
    pub fn speed(&self) -> BusSpeed {
        self.speed
    }
}

impl BusSession for LinuxI2cSession {
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        trace!("write 0x{:02X} <- 0x{:02X}", register, value);
        self.device
            .write(&[register, value])
            .map_err(|e| BusError::Write(io_detail(e).to_string()))
    }

    fn write_read(&mut self, write_data: &[u8], read_buffer: &mut [u8]) -> Result<(), BusError> {
        let expected = read_buffer.len();
        let mut msgs = [
            LinuxI2CMessage::write(write_data),
            LinuxI2CMessage::read(read_buffer),
        ];
        let msg_count = msgs.len() as u32;
        let completed = self
            .device
            .transfer(&mut msgs)
            .map_err(|e| BusError::Transaction(io_detail(e).to_string()))?;
        if completed != msg_count {
            return Err(BusError::Transaction(format!(
                "only {} of {} messages completed while reading {} bytes",
                completed, msg_count, expected
            )));
        }
        Ok(())
    }

    fn controller(&self) -> &str {
        &self.controller
    }

    fn address(&self) -> u16 {
        self.address
    }

    fn close(self) {
        debug!("closing 0x{:02X} on {}", self.address, self.controller);
        // Ownership is released in Drop
    }
}

impl Drop for LinuxI2cSession {
    fn drop(&mut self) {
        let released = OWNED_ADDRESSES
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(self.controller.clone(), self.address));
        if !released {
            warn!(
                "0x{:02X} on {} was not registered as owned",
                self.address, self.controller
            );
        }
    }
}
