//! Boot staging and the runtime threads.
//!
//! Boot walks a fixed ladder of stages; anything that must not touch
//! flash or the bus early waits on the [`BootGate`]. Once the device is
//! up, [`Runtime::start`] spawns the two background threads: the LED
//! runner, which doubles as the chip-test runner, and the ASID drain
//! timer.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bridge_core::{BusPort, ClockPort, FlashSector};
use log::{debug, info};

use crate::device::{Device, DeviceShared};
use crate::selftest::SidTester;
use crate::vu::{LedTask, TICK_INTERVAL_MS};

/// Boot milestones, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum BootStage {
    /// Power on, nothing initialised.
    Cold = 0,
    /// Flash may be read and written.
    FlashSafe = 1,
    /// Configuration loaded and installed.
    ConfigReady = 2,
    /// Bus clock programmed.
    ClockReady = 3,
    /// Chips reset and audible.
    HardwareReady = 4,
    /// Runtime threads live.
    Running = 5,
}

impl BootStage {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::FlashSafe,
            2 => Self::ConfigReady,
            3 => Self::ClockReady,
            4 => Self::HardwareReady,
            5 => Self::Running,
            _ => Self::Cold,
        }
    }
}

/// Monotonic boot progress marker, shared across threads.
///
/// Stages only move forward; advancing to a stage already passed is a
/// no-op.
#[derive(Debug)]
pub struct BootGate {
    stage: AtomicU8,
}

impl BootGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stage: AtomicU8::new(BootStage::Cold as u8),
        }
    }

    #[must_use]
    pub fn current(&self) -> BootStage {
        BootStage::from_raw(self.stage.load(Ordering::Acquire))
    }

    pub fn advance(&self, stage: BootStage) {
        self.stage.fetch_max(stage as u8, Ordering::AcqRel);
        debug!("boot stage {stage:?}");
    }

    #[must_use]
    pub fn reached(&self, stage: BootStage) -> bool {
        self.current() >= stage
    }

    /// Spin until the given stage has been passed.
    pub fn wait_for(&self, stage: BootStage) {
        while !self.reached(stage) {
            thread::yield_now();
            thread::sleep(Duration::from_micros(50));
        }
    }
}

impl Default for BootGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles of the background threads. Dropping it shuts them down and
/// joins them.
pub struct Runtime {
    shared: Arc<DeviceShared>,
    led: Option<JoinHandle<()>>,
    drain: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Spawn the LED/test runner and the ASID drain timer, then mark
    /// the device running.
    pub fn start<P, F>(device: Arc<Mutex<Device<P, F>>>, shared: Arc<DeviceShared>) -> Self
    where
        P: BusPort + ClockPort + Send + 'static,
        F: FlashSector + Send + 'static,
    {
        let led = {
            let device = Arc::clone(&device);
            let shared = Arc::clone(&shared);
            thread::spawn(move || led_runner(&device, &shared))
        };
        let drain = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || drain_runner(&device, &shared))
        };
        shared.gate.advance(BootStage::Running);
        info!("runtime threads up");
        Self {
            shared,
            led: Some(led),
            drain: Some(drain),
        }
    }

    /// Stop both threads and wait for them.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shared.shutdown();
        if let Some(handle) = self.led.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.drain.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}

/// LED meter loop at millisecond cadence. Picks up queued chip tests
/// between passes and takes the activity flag down when the silence
/// watch expires.
fn led_runner<P, F>(device: &Arc<Mutex<Device<P, F>>>, shared: &Arc<DeviceShared>)
where
    P: BusPort + ClockPort,
    F: FlashSector,
{
    shared.gate.wait_for(BootStage::HardwareReady);
    let mut task = LedTask::new();
    let mut now_ms: u32 = 0;
    while shared.live() {
        if let Some(request) = shared.take_test_request() {
            let sleep = |ms| thread::sleep(Duration::from_millis(ms));
            SidTester::new(device, Arc::clone(shared), sleep).run(request);
            continue;
        }

        let active = shared.data_activity();
        let (first, keyed, led, rgb) = {
            let device = device.lock().unwrap_or_else(PoisonError::into_inner);
            let config = device.config();
            let keyed_chip = config.rgb.sid_to_use.max(1) - 1;
            (
                device.voice_bytes(0),
                device.voice_bytes(keyed_chip),
                config.led,
                config.rgb,
            )
        };
        let update = task.tick(now_ms, active, first, keyed, &led, &rgb);
        if let Some(output) = update.output {
            shared.set_led(output.pwm, output.pixel);
        }
        if update.idle_timeout {
            info!("no data for twenty seconds, stream presumed gone");
            shared.set_data_activity(false);
        }

        thread::sleep(Duration::from_millis(u64::from(TICK_INTERVAL_MS)));
        now_ms = now_ms.wrapping_add(TICK_INTERVAL_MS);
    }
    shared.set_led(0, [0, 0, 0]);
}

/// ASID drain timer. Sleeps one frame interval, drains, and picks up
/// interval changes the stream announced.
fn drain_runner<P, F>(device: &Arc<Mutex<Device<P, F>>>, shared: &Arc<DeviceShared>)
where
    P: BusPort + ClockPort,
    F: FlashSector,
{
    shared.gate.wait_for(BootStage::HardwareReady);
    let mut interval_us = {
        let device = device.lock().unwrap_or_else(PoisonError::into_inner);
        u64::from(device.drain_interval())
    };
    while shared.live() {
        thread::sleep(Duration::from_micros(interval_us));
        let mut device = device.lock().unwrap_or_else(PoisonError::into_inner);
        device.drain_asid();
        if let Some(interval) = device.take_drain_update() {
            interval_us = u64::from(interval);
            debug!("asid drain interval now {interval_us} us");
        }
    }
}
