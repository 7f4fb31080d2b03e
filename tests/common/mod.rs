//! Fakes shared by the integration tests
//!
//! Every collaborator of the wake cycle has a deterministic stand-in here:
//! a stepped clock shared with the network (so a time handshake can move
//! it), a scripted uploader that answers per channel, and recording pins,
//! delays and power control.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use canopy::config::NodeConfig;
use canopy::cycle::RetainedBuffer;
use canopy::http::Endpoint;
use canopy::indicator::StatusLed;
use canopy::lifecycle::{Board, PowerControl, SleepPlan};
use canopy::net::{NetError, Network, Uploader};
use canopy::sensors::{Sensor, SensorChannel, SensorError};
use canopy::storage::{MemoryMedium, ReadoutLog};
use canopy::time::Clock;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;

/// 2023-11-14T22:13:20Z
pub const T_ABS: i64 = 1_700_000_000_000;

pub const COLLECTOR_URL: &str = "http://collector.local/api/readouts";

pub fn config() -> NodeConfig<'static> {
    NodeConfig {
        device_id: "node-7",
        collector_url: COLLECTOR_URL,
        ..NodeConfig::default()
    }
}

pub fn endpoint() -> Endpoint {
    Endpoint::parse(COLLECTOR_URL).unwrap()
}

/// Wall clock plus uptime, shared between the board and the network.
#[derive(Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<i64>>,
    uptime: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn at(now_ms: i64) -> Self {
        let clock = Self::default();
        clock.set(now_ms);
        clock
    }

    pub fn set(&self, now_ms: i64) {
        self.now.set(now_ms);
    }

    /// Let time pass while the node is asleep: the wall clock runs on, the
    /// uptime counter starts over.
    pub fn sleep(&self, ms: i64) {
        self.now.set(self.now.get() + ms);
        self.uptime.set(0);
    }

    /// Let time pass while the node is awake.
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms as i64);
        self.uptime.set(self.uptime.get() + ms);
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }

    fn uptime_ms(&self) -> u64 {
        self.uptime.get()
    }
}

/// Sensor returning a scripted value, or failing when `None`.
pub struct FakeSensor(pub Option<i32>);

impl Sensor for FakeSensor {
    async fn read(&mut self) -> Result<i32, SensorError> {
        self.0.ok_or(SensorError::Timeout {
            sensor: "fake",
            operation: "measure",
        })
    }
}

pub struct FakeNetwork {
    pub clock: SimClock,
    pub connect_result: Result<(), NetError>,
    /// Wall clock the time handshake sets; `None` makes every attempt time out
    pub time_source: Option<i64>,
    pub provision_result: Result<(), NetError>,
    pub connects: u32,
    pub time_attempts: u32,
    pub disconnects: u32,
    pub provisions: u32,
}

impl FakeNetwork {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            connect_result: Ok(()),
            time_source: Some(T_ABS),
            provision_result: Ok(()),
            connects: 0,
            time_attempts: 0,
            disconnects: 0,
            provisions: 0,
        }
    }
}

impl Network for FakeNetwork {
    async fn connect(&mut self, _timeout: Duration) -> Result<(), NetError> {
        self.connects += 1;
        self.connect_result
    }

    async fn acquire_absolute_time(&mut self, _timeout: Duration) -> Result<(), NetError> {
        self.time_attempts += 1;
        let now = self.time_source.ok_or(NetError::Timeout)?;
        self.clock.set(now);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.disconnects += 1;
    }

    async fn provision(&mut self, _timeout: Duration) -> Result<(), NetError> {
        self.provisions += 1;
        self.provision_result
    }
}

/// One POST as the collector saw it.
#[derive(Debug, Clone)]
pub struct Post {
    pub sensor_type: String,
    pub body: serde_json::Value,
}

/// Collector answering per channel code; unknown channels get 201.
#[derive(Default)]
pub struct FakeCollector {
    pub responses: HashMap<String, Result<u16, NetError>>,
    pub posts: Vec<Post>,
}

impl FakeCollector {
    pub fn answer(mut self, code: &str, response: Result<u16, NetError>) -> Self {
        self.responses.insert(code.to_string(), response);
        self
    }

    pub fn posts_for(&self, code: &str) -> Vec<&Post> {
        self.posts.iter().filter(|p| p.sensor_type == code).collect()
    }
}

impl Uploader for FakeCollector {
    async fn post(
        &mut self,
        _endpoint: &Endpoint,
        body: &[u8],
        _timeout: Duration,
    ) -> Result<u16, NetError> {
        let body: serde_json::Value = serde_json::from_slice(body).unwrap();
        let sensor_type = body[0]["sensor_type"].as_str().unwrap().to_string();
        let response = self.responses.get(&sensor_type).copied().unwrap_or(Ok(201));

        self.posts.push(Post { sensor_type, body });
        response
    }
}

/// Delay that returns at once and adds up what was asked for.
#[derive(Clone, Default)]
pub struct InstantDelay(pub Rc<Cell<u64>>);

impl DelayNs for InstantDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + ns as u64 / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.0.set(self.0.get() + ms as u64);
    }
}

/// Delay that hands control back to the executor once per call.
#[derive(Default)]
pub struct YieldingDelay;

impl DelayNs for YieldingDelay {
    async fn delay_ns(&mut self, _ns: u32) {
        embassy_futures::yield_now().await;
    }
}

#[derive(Clone, Default)]
pub struct LedPin(pub Rc<Cell<bool>>);

impl ErrorType for LedPin {
    type Error = Infallible;
}

impl OutputPin for LedPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.set(true);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePower {
    pub armed: Vec<SleepPlan>,
}

impl PowerControl for FakePower {
    fn arm(&mut self, plan: &SleepPlan) {
        self.armed.push(*plan);
    }

    fn deep_sleep(&mut self) -> ! {
        panic!("deep sleep is not available in tests");
    }
}

pub type TestBoard = Board<
    FakeSensor,
    MemoryMedium,
    FakeNetwork,
    FakeCollector,
    SimClock,
    RetainedBuffer,
    InstantDelay,
    LedPin,
    YieldingDelay,
>;

/// Board with the given `(code, cadence, value)` channels, the clock at
/// `now_ms` and an empty medium.
pub fn board(channels: &[(&str, u32, Option<i32>)], now_ms: i64) -> TestBoard {
    let clock = SimClock::at(now_ms);

    Board {
        channels: channels
            .iter()
            .map(|&(code, cadence, value)| {
                SensorChannel::new(code, cadence, FakeSensor(value)).unwrap()
            })
            .collect(),
        log: ReadoutLog::new(MemoryMedium::new()),
        network: FakeNetwork::new(clock.clone()),
        uploader: FakeCollector::default(),
        clock,
        retained: RetainedBuffer::new(),
        delay: InstantDelay::default(),
        led: StatusLed::new(LedPin::default(), YieldingDelay),
    }
}

/// Number of valid records currently buffered for `code`.
pub fn count(board: &mut TestBoard, code: &str) -> usize {
    let code = canopy::sensors::ChannelCode::new(code).unwrap();
    let log = &mut board.log;

    let was_mounted = log.is_mounted();
    if !was_mounted {
        log.mount().unwrap();
    }
    let n = log.count(&code);
    if !was_mounted {
        log.unmount();
    }
    n
}
