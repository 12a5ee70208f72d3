// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Background polling runtime.
//!
//! [`GyroPoller::start`] spawns one worker thread. The worker acquires and
//! configures the device, then reads it immediately and again on every tick
//! of a fixed-period ticker until [`GyroPoller::stop`] is called. Results are
//! pushed to a [`SampleConsumer`].

use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{
    bounded, select, tick, unbounded, Receiver, Sender, TryRecvError, TrySendError,
};
use log::{debug, error, info, trace};

use crate::{
    constants::POLL_PERIOD,
    driver::{acquire, DriverState, FatalError, Itg3200},
    interface::{BusController, BusSession},
    sample::{DriverEvent, RawSample},
};

/// Receives the output of the polling runtime.
///
/// Called from the worker thread at most once per tick. Implementations
/// must return quickly; a slow consumer delays the next read.
pub trait SampleConsumer: Send + 'static {
    fn on_sample(&mut self, x: i16, y: i16, z: i16);

    fn on_fault(&mut self, message: &str);

    /// Initialization failed. Called at most once, and never followed by
    /// samples or faults.
    ///
    /// Defaults to reporting the fatal condition through [`on_fault`].
    ///
    /// [`on_fault`]: SampleConsumer::on_fault
    fn on_fatal(&mut self, error: &FatalError) {
        self.on_fault(&error.to_string());
    }
}

/// Forwards events over a channel
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    tx: Sender<DriverEvent>,
}

/// Create a consumer and the receiving end of its events
///
/// The channel is unbounded: every event is kept until received, so a
/// receiver that stops reading grows the queue by one event per tick. Use
/// [`bounded_event_channel`] when only recent events matter.
pub fn event_channel() -> (ChannelConsumer, Receiver<DriverEvent>) {
    let (tx, rx) = unbounded();
    (ChannelConsumer { tx }, rx)
}

/// Create a consumer whose queue holds at most `capacity` events
///
/// Events arriving while the queue is full are dropped; the worker never
/// waits on the receiver.
pub fn bounded_event_channel(capacity: usize) -> (ChannelConsumer, Receiver<DriverEvent>) {
    let (tx, rx) = bounded(capacity);
    (ChannelConsumer { tx }, rx)
}

impl ChannelConsumer {
    fn send(&self, event: DriverEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!("event queue full, dropped {:?}", event),
            Err(TrySendError::Disconnected(_)) => trace!("event receiver dropped"),
        }
    }
}

impl SampleConsumer for ChannelConsumer {
    fn on_sample(&mut self, x: i16, y: i16, z: i16) {
        self.send(DriverEvent::Sample(RawSample { x, y, z }));
    }

    fn on_fault(&mut self, message: &str) {
        self.send(DriverEvent::Fault(message.to_string()));
    }

    fn on_fatal(&mut self, error: &FatalError) {
        self.send(DriverEvent::Fatal(error.clone()));
    }
}

/// Runtime settings of the poller
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Controller to open; `None` takes the first one discovered
    pub controller: Option<String>,
    /// Time between reads
    pub poll_period: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            controller: None,
            poll_period: POLL_PERIOD,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<DriverState>,
    ticks: AtomicU64,
    exited: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: DriverState) {
        *self.state() = state;
    }
}

/// Marks the worker as exited once it has released everything, even on panic
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.exited.store(true, Ordering::Release);
    }
}

/// Handle to a running gyro poller
///
/// Dropping the handle stops the poller.
pub struct GyroPoller {
    shared: Arc<Shared>,
    stop_tx: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GyroPoller {
    /// Spawn the worker that initializes the device and polls it
    pub fn start<C, N>(controller: C, config: DriverConfig, consumer: N) -> io::Result<Self>
    where
        C: BusController + Send + 'static,
        C::Session: 'static,
        N: SampleConsumer,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let exit_guard = ExitGuard(Arc::clone(&shared));

        let worker = thread::Builder::new()
            .name("itg3200-poll".to_string())
            .spawn(move || {
                let _exit_guard = exit_guard;
                Worker {
                    shared: worker_shared,
                    stop_rx,
                    consumer,
                }
                .run(controller, config)
            })?;

        Ok(Self {
            shared,
            stop_tx: Mutex::new(Some(stop_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Snapshot of the driver state
    pub fn state(&self) -> DriverState {
        self.shared.state().clone()
    }

    /// Most recent sample, while the driver is ready
    pub fn latest_sample(&self) -> Option<RawSample> {
        self.shared.state().sample()
    }

    /// Number of poll ticks run so far
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    /// The worker has exited (fatal error or stop) and released the device
    pub fn is_finished(&self) -> bool {
        self.shared.exited.load(Ordering::Acquire)
    }

    /// Cancel the ticker and release the device.
    ///
    /// A tick in progress finishes first. Safe to call more than once.
    pub fn stop(&self) {
        // Dropping the sender disconnects the worker's stop channel
        let stop_tx = self
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if stop_tx.is_none() {
            return;
        }
        drop(stop_tx);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            // Stopped from a consumer callback; the worker exits on its own
            // after the current tick.
            return;
        }
        if worker.join().is_err() {
            error!("gyro poll worker panicked");
        }
        debug!("gyro poller stopped");
    }
}

impl Drop for GyroPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<N> {
    shared: Arc<Shared>,
    stop_rx: Receiver<()>,
    consumer: N,
}

impl<N: SampleConsumer> Worker<N> {
    fn stop_requested(&self) -> bool {
        matches!(self.stop_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn fatal(&mut self, err: FatalError) {
        error!("{}", err);
        self.shared.set_state(DriverState::Fatal(err.clone()));
        self.consumer.on_fatal(&err);
    }

    fn run<C: BusController>(mut self, controller: C, config: DriverConfig) {
        self.shared.set_state(DriverState::Configuring);

        let session = match acquire(&controller, config.controller.as_deref()) {
            Ok(session) => session,
            Err(e) => return self.fatal(e),
        };
        let mut gyro = Itg3200::new_with_session(session);
        if self.stop_requested() {
            debug!("stop requested during initialization");
            return gyro.close();
        }

        if let Err(e) = gyro.configure() {
            self.fatal(e);
            return gyro.close();
        }
        self.shared.set_state(gyro.state().clone());
        info!(
            "polling 0x{:02X} on {} every {:?}",
            gyro.session().address(),
            gyro.session().controller(),
            config.poll_period
        );

        let ticker = tick(config.poll_period);
        while !self.stop_requested() {
            self.tick(&mut gyro);
            let stop = select! {
                recv(self.stop_rx) -> _ => true,
                recv(ticker) -> _ => false,
            };
            if stop {
                break;
            }
        }
        gyro.close();
    }

    fn tick<S: BusSession>(&mut self, gyro: &mut Itg3200<S>) {
        self.shared.ticks.fetch_add(1, Ordering::AcqRel);
        let result = gyro.poll();
        self.shared.set_state(gyro.state().clone());
        match result {
            Ok(sample) => {
                trace!("{}", sample);
                self.consumer.on_sample(sample.x, sample.y, sample.z);
            }
            Err(e) => self.consumer.on_fault(&e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::mock::SimulatedBus;
    use std::time::Instant;

    fn fast_config() -> DriverConfig {
        DriverConfig {
            poll_period: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.controller, None);
        assert_eq!(config.poll_period, Duration::from_millis(500));
    }

    #[test]
    fn test_channel_consumer_survives_dropped_receiver() {
        let (mut consumer, rx) = event_channel();
        drop(rx);
        consumer.on_sample(1, 2, 3);
        consumer.on_fault("gone");
    }

    #[test]
    fn test_poller_reads_immediately() {
        let bus = SimulatedBus::new(&["sim-0"]);
        bus.set_default_read_data(&[0x00, 0x01, 0x00, 0x02, 0x00, 0x03]);
        let (consumer, rx) = event_channel();

        // A long period: only the immediate first read can happen in time
        let config = DriverConfig {
            poll_period: Duration::from_secs(60),
            ..Default::default()
        };
        let poller = GyroPoller::start(bus.clone(), config, consumer).unwrap();
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, DriverEvent::Sample(RawSample { x: 1, y: 2, z: 3 }));
        assert_eq!(poller.latest_sample(), Some(RawSample { x: 1, y: 2, z: 3 }));
        assert_eq!(poller.ticks(), 1);
        poller.stop();
    }

    #[test]
    fn test_stop_from_consumer_callback() {
        struct Stopper {
            slot: Arc<Mutex<Option<Arc<GyroPoller>>>>,
            stopped_tx: Sender<()>,
            release_rx: Receiver<()>,
        }
        impl SampleConsumer for Stopper {
            fn on_sample(&mut self, _x: i16, _y: i16, _z: i16) {
                if let Some(poller) = self.slot.lock().unwrap().take() {
                    poller.stop();
                    let _ = self.stopped_tx.send(());
                    // Hold the worker inside the tick until the test lets go
                    let _ = self.release_rx.recv_timeout(Duration::from_secs(5));
                }
            }
            fn on_fault(&mut self, _message: &str) {}
        }

        let bus = SimulatedBus::new(&["sim-0"]);
        let slot = Arc::new(Mutex::new(None));
        let (stopped_tx, stopped_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        let consumer = Stopper {
            slot: slot.clone(),
            stopped_tx,
            release_rx,
        };
        let poller = Arc::new(GyroPoller::start(bus.clone(), fast_config(), consumer).unwrap());
        *slot.lock().unwrap() = Some(Arc::clone(&poller));

        stopped_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Stop returned but the worker is still in the tick holding the device
        assert!(!poller.is_finished());
        assert!(bus.is_owned("sim-0", 0x68));
        assert_eq!(bus.close_count(), 0);

        release_tx.send(()).unwrap();
        assert!(wait_until(Duration::from_secs(5), || poller.is_finished()));
        assert_eq!(bus.close_count(), 1);
        assert!(!bus.is_owned("sim-0", 0x68));
    }

    #[test]
    fn test_full_bounded_channel_does_not_block_polling() {
        let bus = SimulatedBus::new(&["sim-0"]);
        let (consumer, rx) = bounded_event_channel(1);
        let poller = GyroPoller::start(bus.clone(), fast_config(), consumer).unwrap();

        // Nobody reads: the queue fills after one event and later ones are dropped
        assert!(wait_until(Duration::from_secs(5), || poller.ticks() >= 5));
        assert_eq!(rx.len(), 1);
        assert!(matches!(rx.try_recv(), Ok(DriverEvent::Sample(_))));
        poller.stop();
        assert!(poller.is_finished());
    }

    #[test]
    fn test_is_finished_after_fatal() {
        let bus = SimulatedBus::new::<&str>(&[]);
        let (consumer, rx) = event_channel();
        let poller = GyroPoller::start(bus, fast_config(), consumer).unwrap();

        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(DriverEvent::Fatal(FatalError::NoControllerFound))
        ));
        assert!(wait_until(Duration::from_secs(5), || poller.is_finished()));
        assert_eq!(poller.ticks(), 0);
    }
}
