//! Simulated board peripherals: clock, delays, LED, retained memory and power.

use std::cell::Cell;
use std::convert::Infallible;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use canopy::cycle::{CycleState, RETAINED_IMAGE_LEN, RetainedBuffer, RetainedStore};
use canopy::lifecycle::{PowerControl, SleepPlan};
use canopy::time::Clock;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use log::{info, trace, warn};

/// Virtual wall clock and uptime counter.
///
/// Nothing in the simulator really waits: delays and network latency move
/// this clock forward instead.
#[derive(Clone, Default)]
pub struct VirtualClock {
    wall_ms: Rc<Cell<i64>>,
    uptime_ms: Rc<Cell<u64>>,
}

impl VirtualClock {
    /// A clock that was never set, like the RTC right after power-on.
    pub fn unset() -> Self {
        Self::default()
    }

    pub fn host_time() -> Self {
        let clock = Self::default();
        clock.set_to_host_time();
        clock
    }

    pub fn set_to_host_time(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        self.wall_ms.set(now as i64);
    }

    pub fn advance(&self, ms: u64) {
        self.wall_ms.set(self.wall_ms.get() + ms as i64);
        self.uptime_ms.set(self.uptime_ms.get() + ms);
    }

    /// Deep sleep: the wall clock keeps running, uptime restarts.
    pub fn sleep(&self, ms: u64) {
        self.wall_ms.set(self.wall_ms.get() + ms as i64);
        self.uptime_ms.set(0);
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> i64 {
        self.wall_ms.get()
    }

    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.get()
    }
}

/// Delay that advances the virtual clock.
#[derive(Clone)]
pub struct VirtualDelay(pub VirtualClock);

impl DelayNs for VirtualDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.0.advance(u64::from(ns) / 1_000_000);
        embassy_futures::yield_now().await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.0.advance(u64::from(ms));
        embassy_futures::yield_now().await;
    }
}

#[derive(Default)]
pub struct SimLed {
    lit: bool,
}

impl ErrorType for SimLed {
    type Error = Infallible;
}

impl OutputPin for SimLed {
    fn set_low(&mut self) -> Result<(), Infallible> {
        if self.lit {
            trace!("LED off");
        }
        self.lit = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        if !self.lit {
            trace!("LED on");
        }
        self.lit = true;
        Ok(())
    }
}

/// RTC memory mirrored to a file so a run can be inspected afterwards.
pub struct RetainedFile {
    path: PathBuf,
    buffer: RetainedBuffer,
}

impl RetainedFile {
    /// Load the image left by an earlier run, if any.
    pub fn open(path: PathBuf) -> Self {
        let buffer = fs::read(&path)
            .ok()
            .and_then(|bytes| <[u8; RETAINED_IMAGE_LEN]>::try_from(bytes).ok())
            .map(RetainedBuffer::from_bytes)
            .unwrap_or_default();

        Self { path, buffer }
    }

    pub fn holds_state(&mut self) -> bool {
        self.buffer.load().is_some()
    }

    /// Power loss wipes RTC memory.
    pub fn power_loss(&mut self) {
        self.buffer.power_loss();
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = fs::write(&self.path, self.buffer.as_bytes()) {
            warn!("Failed to write {}: {}", self.path.display(), e);
        }
    }
}

impl RetainedStore for RetainedFile {
    fn load(&mut self) -> Option<CycleState> {
        self.buffer.load()
    }

    fn store(&mut self, state: &CycleState) {
        self.buffer.store(state);
        self.persist();
    }
}

/// Records the armed wake sources; deep sleep ends the process.
#[derive(Default)]
pub struct SimPower {
    pub armed: Option<SleepPlan>,
}

impl PowerControl for SimPower {
    fn arm(&mut self, plan: &SleepPlan) {
        match plan.ext_wake_pin {
            Some(pin) => info!("Armed timer {:?} and GPIO{} wake", plan.timer, pin),
            None => info!("Armed timer {:?}", plan.timer),
        }
        self.armed = Some(*plan);
    }

    fn deep_sleep(&mut self) -> ! {
        info!("Entering deep sleep, simulator exiting");
        std::process::exit(0)
    }
}
