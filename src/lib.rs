// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ITG-3200 3-axis MEMS gyroscope driver
//!
//! Reads angular rate from an ITG-3200 on a Linux I2C bus. The driver
//! acquires the device at `0x68`, powers it up with the X gyro PLL as clock
//! source, selects the +/-2000 deg/s range, then reads the three axes every
//! 500 ms and hands each sample (or fault) to a consumer.
//!
//! ```no_run
//! use itg3200::{event_channel, DriverConfig, GyroPoller, LinuxI2cBus};
//!
//! let (consumer, events) = event_channel();
//! let poller = GyroPoller::start(LinuxI2cBus::new(), DriverConfig::default(), consumer)?;
//! for event in events.iter().take(10) {
//!     println!("{:?}", event);
//! }
//! poller.stop();
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod constants;
pub mod driver;
pub mod interface;
pub mod poller;
pub mod sample;

pub use driver::{acquire, address_report, DriverError, DriverState, FatalError, Itg3200};
pub use interface::{
    linux::{LinuxI2cBus, LinuxI2cSession},
    mock::SimulatedBus,
    BusController, BusError, BusSession, BusSpeed,
};
pub use poller::{
    bounded_event_channel, event_channel, ChannelConsumer, DriverConfig, GyroPoller,
    SampleConsumer,
};
pub use sample::{decode_raw, decode_word, DriverEvent, RawSample};
