// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! ITG-3200 gyroscope driver implementation.
//!
//! This module contains the blocking driver: device acquisition, the
//! one-time register configuration, the burst read of the three axes and
//! the driver state machine. The periodic runtime lives in
//! [`crate::poller`].

use std::fmt;

use log::{debug, error, trace, warn};
use thiserror::Error;

use crate::{
    constants::{
        GYRO_BUS_SPEED, GYRO_DATA_LEN, GYRO_DLPF_FS_2000_BW_256, GYRO_I2C_ADDR,
        GYRO_POWER_PLL_X, GYRO_REG_DLPF, GYRO_REG_POWER, GYRO_REG_X,
    },
    interface::{BusController, BusError, BusSession},
    sample::RawSample,
};

/// Conditions that stop the driver before polling starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("NoControllerFound: no I2C controllers were found on the system")]
    NoControllerFound,

    #[error(
        "AddressInUse: slave address 0x{address:02X} on I2C controller {controller} is \
         currently in use by another application. Please ensure that no other \
         applications are using I2C."
    )]
    AddressInUse { controller: String, address: u16 },

    #[error("OpenFailed: slave address 0x{address:02X} on I2C controller {controller}: {detail}")]
    OpenFailed {
        controller: String,
        address: u16,
        detail: String,
    },

    #[error("DiscoveryFailed: {0}")]
    DiscoveryFailed(String),

    #[error("ConfigurationFailed: failed to communicate with device: {0}")]
    ConfigurationFailed(String),
}

/// Errors returned by a poll tick
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The read transaction failed
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The driver was polled before `configure` succeeded
    #[error("driver is not configured (state: {0})")]
    NotConfigured(String),
}

impl FatalError {
    fn from_acquire(err: BusError, controller: &str, address: u16) -> Self {
        match err {
            BusError::NoControllerFound => FatalError::NoControllerFound,
            BusError::AddressInUse {
                controller,
                address,
            } => FatalError::AddressInUse {
                controller,
                address,
            },
            BusError::Open {
                controller,
                address,
                detail,
            } => FatalError::OpenFailed {
                controller,
                address,
                detail,
            },
            BusError::Discovery(detail) => FatalError::DiscoveryFailed(detail),
            other => FatalError::OpenFailed {
                controller: controller.to_string(),
                address,
                detail: other.to_string(),
            },
        }
    }
}

/// Driver lifecycle
///
/// `Ready` and `Faulted` alternate while polling. `Fatal` is terminal.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DriverState {
    #[default]
    Uninitialized,
    Configuring,
    /// Configured; holds the most recent sample once one has been read
    Ready(Option<RawSample>),
    /// The last poll failed; polling continues
    Faulted(String),
    Fatal(FatalError),
}

impl DriverState {
    /// Most recent sample, if the driver is ready and has read one
    pub fn sample(&self) -> Option<RawSample> {
        match self {
            DriverState::Ready(sample) => *sample,
            _ => None,
        }
    }

    /// Polling is (or may be) running in this state
    pub fn is_alive(&self) -> bool {
        matches!(self, DriverState::Ready(_) | DriverState::Faulted(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverState::Fatal(_))
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverState::Uninitialized => write!(f, "Uninitialized"),
            DriverState::Configuring => write!(f, "Configuring"),
            DriverState::Ready(_) => write!(f, "Running"),
            DriverState::Faulted(detail) => write!(f, "Faulted: {}", detail),
            DriverState::Fatal(err) => write!(f, "Fatal: {}", err),
        }
    }
}

/// Line identifying the device and its bus address
pub fn address_report() -> String {
    format!("I2C address of the ITG3200 3-axis MEMS gyro: 0x{:02X}", GYRO_I2C_ADDR)
}

/// Discover a controller and take ownership of the gyro address on it
///
/// `preferred` selects a controller by id; `None` takes the first one
/// enumerated.
pub fn acquire<C: BusController>(
    controller: &C,
    preferred: Option<&str>,
) -> Result<C::Session, FatalError> {
    let controllers = controller
        .discover()
        .map_err(|e| FatalError::from_acquire(e, preferred.unwrap_or_default(), GYRO_I2C_ADDR))?;

    let chosen = match preferred {
        Some(id) => controllers.iter().find(|c| c.as_str() == id),
        None => controllers.first(),
    };
    let Some(chosen) = chosen else {
        error!(
            "no I2C controller available (wanted {:?}, found {:?})",
            preferred, controllers
        );
        return Err(FatalError::NoControllerFound);
    };

    debug!("opening 0x{:02X} on {}", GYRO_I2C_ADDR, chosen);
    controller
        .open(chosen, GYRO_I2C_ADDR, GYRO_BUS_SPEED)
        .map_err(|e| FatalError::from_acquire(e, chosen, GYRO_I2C_ADDR))
}

/// ITG-3200 driver over an open bus session
pub struct Itg3200<S> {
    session: S,
    state: DriverState,
}

impl<S> Itg3200<S> {
    /// Create a driver over an already opened session
    pub fn new_with_session(session: S) -> Self {
        Self {
            session,
            state: DriverState::Uninitialized,
        }
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Returns the session without closing it
    pub fn free(self) -> S {
        self.session
    }
}

impl<S: BusSession> Itg3200<S> {
    /// Acquire the device through `controller` and wrap it in a driver
    pub fn open<C>(controller: &C, preferred: Option<&str>) -> Result<Self, FatalError>
    where
        C: BusController<Session = S>,
    {
        acquire(controller, preferred).map(Self::new_with_session)
    }

    /// Power the device up and select range and filtering.
    ///
    /// On failure the driver is `Fatal` and must not be polled.
    pub fn configure(&mut self) -> Result<(), FatalError> {
        trace!("driver configure");
        self.state = DriverState::Configuring;

        let result = self
            .session
            .write_register(GYRO_REG_POWER, GYRO_POWER_PLL_X)
            .and_then(|_| {
                self.session
                    .write_register(GYRO_REG_DLPF, GYRO_DLPF_FS_2000_BW_256)
            });

        match result {
            Ok(()) => {
                debug!(
                    "configured 0x{:02X} on {}",
                    self.session.address(),
                    self.session.controller()
                );
                self.state = DriverState::Ready(None);
                Ok(())
            }
            Err(e) => {
                let err = FatalError::ConfigurationFailed(e.to_string());
                error!("{}", err);
                self.state = DriverState::Fatal(err.clone());
                Err(err)
            }
        }
    }

    /// Read and decode one sample without touching the driver state
    pub fn read_sample(&mut self) -> Result<RawSample, BusError> {
        let mut buf = [0u8; GYRO_DATA_LEN];
        self.session.write_read(&[GYRO_REG_X], &mut buf)?;
        trace!("axis bytes {:02X?}", buf);
        Ok(RawSample::from_bytes(&buf))
    }

    /// One poll tick: read a sample and move between `Ready` and `Faulted`
    ///
    /// Polling before a successful [`configure`](Self::configure) is a
    /// caller error; the bus is not touched and the state is unchanged.
    pub fn poll(&mut self) -> Result<RawSample, DriverError> {
        if !self.state.is_alive() {
            warn!("poll on a driver in state {}", self.state);
            return Err(DriverError::NotConfigured(self.state.to_string()));
        }

        match self.read_sample() {
            Ok(sample) => {
                self.state = DriverState::Ready(Some(sample));
                Ok(sample)
            }
            Err(e) => {
                warn!("{}", e);
                self.state = DriverState::Faulted(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Release the device
    pub fn close(self) {
        self.session.close();
    }
}
