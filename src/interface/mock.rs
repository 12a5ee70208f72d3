// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Simulated bus for testing without hardware.
//!
//! Records every transaction for verification and lets tests script the
//! data (or the failures) returned by reads.

use std::{
    collections::{BTreeSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use log::trace;

use super::{BusController, BusError, BusSession, BusSpeed};

/// Transaction seen by the simulated bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cTransaction {
    /// Controller enumeration
    Discover,
    /// Device acquisition
    Open {
        controller: String,
        address: u16,
        speed: BusSpeed,
    },
    /// Write transaction
    Write { addr: u16, data: Vec<u8> },
    /// Write-Read transaction
    WriteRead {
        addr: u16,
        write_data: Vec<u8>,
        read_len: usize,
    },
    /// Session release
    Close { controller: String, address: u16 },
}

#[derive(Debug, Default)]
struct SimState {
    controllers: Vec<String>,
    owned: BTreeSet<(String, u16)>,
    transactions: Vec<I2cTransaction>,
    read_data: VecDeque<Result<Vec<u8>, String>>,
    default_read_data: Vec<u8>,
    write_error: Option<String>,
    discover_delay: Duration,
}

/// Simulated bus controller service
///
/// Clones share the same simulated hardware, so a test can keep one handle
/// while the driver owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBus {
    /// Create a bus service exposing the given controllers
    pub fn new<S: AsRef<str>>(controllers: &[S]) -> Self {
        let state = SimState {
            controllers: controllers.iter().map(|c| c.as_ref().to_string()).collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make enumeration take `delay` before answering
    pub fn set_discover_delay(&self, delay: Duration) {
        self.lock().discover_delay = delay;
    }

    /// Mark `address` as owned by some other party
    pub fn claim(&self, controller: &str, address: u16) {
        self.lock().owned.insert((controller.to_string(), address));
    }

    /// Is `address` currently owned on `controller`
    pub fn is_owned(&self, controller: &str, address: u16) -> bool {
        self.lock().owned.contains(&(controller.to_string(), address))
    }

    /// Queue data for the next read
    pub fn push_read_data(&self, data: &[u8]) {
        self.lock().read_data.push_back(Ok(data.to_vec()));
    }

    /// Queue a failure for the next read
    pub fn push_read_error(&self, detail: &str) {
        self.lock().read_data.push_back(Err(detail.to_string()));
    }

    /// Data returned once the queue is empty
    pub fn set_default_read_data(&self, data: &[u8]) {
        self.lock().default_read_data = data.to_vec();
    }

    /// Make every register write fail with `detail`
    pub fn fail_writes(&self, detail: &str) {
        self.lock().write_error = Some(detail.to_string());
    }

    /// Get transaction log (for test verification)
    pub fn transactions(&self) -> Vec<I2cTransaction> {
        self.lock().transactions.clone()
    }

    /// Register writes as `(register, value)` pairs, in order
    pub fn register_writes(&self) -> Vec<(u8, u8)> {
        self.lock()
            .transactions
            .iter()
            .filter_map(|t| match t {
                I2cTransaction::Write { data, .. } if data.len() == 2 => Some((data[0], data[1])),
                _ => None,
            })
            .collect()
    }

    /// Number of write-read transactions issued
    pub fn read_count(&self) -> usize {
        self.lock()
            .transactions
            .iter()
            .filter(|t| matches!(t, I2cTransaction::WriteRead { .. }))
            .count()
    }

    /// Number of sessions closed
    pub fn close_count(&self) -> usize {
        self.lock()
            .transactions
            .iter()
            .filter(|t| matches!(t, I2cTransaction::Close { .. }))
            .count()
    }
}

impl BusController for SimulatedBus {
    type Session = SimulatedSession;

    fn discover(&self) -> Result<Vec<String>, BusError> {
        let delay = {
            let mut state = self.lock();
            state.transactions.push(I2cTransaction::Discover);
            state.discover_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(self.lock().controllers.clone())
    }

    fn open(
        &self,
        controller: &str,
        address: u16,
        speed: BusSpeed,
    ) -> Result<SimulatedSession, BusError> {
        let mut state = self.lock();
        state.transactions.push(I2cTransaction::Open {
            controller: controller.to_string(),
            address,
            speed,
        });
        if !state.controllers.iter().any(|c| c == controller) {
            return Err(BusError::Open {
                controller: controller.to_string(),
                address,
                detail: "no such controller".to_string(),
            });
        }
        if !state.owned.insert((controller.to_string(), address)) {
            return Err(BusError::AddressInUse {
                controller: controller.to_string(),
                address,
            });
        }
        Ok(SimulatedSession {
            state: Arc::clone(&self.state),
            controller: controller.to_string(),
            address,
        })
    }
}

/// A device opened on a [`SimulatedBus`]
#[derive(Debug)]
pub struct SimulatedSession {
    state: Arc<Mutex<SimState>>,
    controller: String,
    address: u16,
}

impl SimulatedSession {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BusSession for SimulatedSession {
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        let addr = self.address;
        let mut state = self.lock();
        state.transactions.push(I2cTransaction::Write {
            addr,
            data: vec![register, value],
        });
        match &state.write_error {
            Some(detail) => Err(BusError::Write(detail.clone())),
            None => Ok(()),
        }
    }

    fn write_read(&mut self, write_data: &[u8], read_buffer: &mut [u8]) -> Result<(), BusError> {
        let addr = self.address;
        let mut state = self.lock();
        state.transactions.push(I2cTransaction::WriteRead {
            addr,
            write_data: write_data.to_vec(),
            read_len: read_buffer.len(),
        });

        let data = match state.read_data.pop_front() {
            Some(Ok(data)) => data,
            Some(Err(detail)) => return Err(BusError::Transaction(detail)),
            None => state.default_read_data.clone(),
        };
        let to_read = core::cmp::min(read_buffer.len(), data.len());
        read_buffer[..to_read].copy_from_slice(&data[..to_read]);
        read_buffer[to_read..].fill(0);
        trace!("simulated read {:02X?}", read_buffer);
        Ok(())
    }

    fn controller(&self) -> &str {
        &self.controller
    }

    fn address(&self) -> u16 {
        self.address
    }

    fn close(self) {
        let controller = self.controller.clone();
        let address = self.address;
        self.lock()
            .transactions
            .push(I2cTransaction::Close { controller, address });
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        let key = (self.controller.clone(), self.address);
        self.lock().owned.remove(&key);
    }
}
