// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

use itg3200::{address_report, event_channel, DriverConfig, DriverEvent, GyroPoller, LinuxI2cBus};
use log::info;
use std::{env, io};

const BUS_ENV: &str = "ITG3200_I2C_BUS";

fn main() -> io::Result<()> {
    env_logger::init();

    let config = DriverConfig {
        controller: env::var(BUS_ENV).ok(),
        ..Default::default()
    };
    info!("starting gyro on {:?}", config.controller);

    let (consumer, events) = event_channel();
    let poller = GyroPoller::start(LinuxI2cBus::new(), config, consumer)?;

    for event in events.iter() {
        match event {
            DriverEvent::Sample(sample) => {
                println!("{}", address_report());
                println!("X Axis: {}", sample.x);
                println!("Y Axis: {}", sample.y);
                println!("Z Axis: {}", sample.z);
                println!("Status: Running");
            }
            DriverEvent::Fault(message) => {
                println!("X Axis: Error");
                println!("Y Axis: Error");
                println!("Z Axis: Error");
                println!(
                    "Failed to read from 3-Axis MEMS Gyro Angular Rate Sensor: {}",
                    message
                );
            }
            DriverEvent::Fatal(err) => {
                eprintln!("{}", err);
                break;
            }
        }
    }

    poller.stop();
    Ok(())
}
