//! Simulated WiFi link and loopback collector
//!
//! Upload bodies are handed straight to an in-process collector that checks
//! them and appends accepted readouts to a JSON lines file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use canopy::http::Endpoint;
use canopy::net::{NetError, Network, Uploader};
use log::{debug, info, warn};

use crate::hardware::VirtualClock;

const CONNECT_LATENCY_MS: u64 = 1_200;
const SNTP_LATENCY_MS: u64 = 150;
const PROVISIONING_MS: u64 = 8_000;
const UPLOAD_LATENCY_MS: u64 = 300;

pub struct SimNetwork {
    clock: VirtualClock,
    provisioned: bool,
    time_server_up: bool,
    connected: bool,
}

impl SimNetwork {
    pub fn new(clock: VirtualClock, provisioned: bool, time_server_up: bool) -> Self {
        Self {
            clock,
            provisioned,
            time_server_up,
            connected: false,
        }
    }

    fn wait(&self, ms: u64, timeout: Duration) -> Result<(), NetError> {
        if u128::from(ms) > timeout.as_millis() {
            self.clock.advance(timeout.as_millis() as u64);
            return Err(NetError::Timeout);
        }
        self.clock.advance(ms);
        Ok(())
    }
}

impl Network for SimNetwork {
    async fn connect(&mut self, timeout: Duration) -> Result<(), NetError> {
        if !self.provisioned {
            return Err(NetError::NotProvisioned);
        }
        self.wait(CONNECT_LATENCY_MS, timeout)?;
        self.connected = true;
        info!("WiFi connected");
        Ok(())
    }

    async fn acquire_absolute_time(&mut self, timeout: Duration) -> Result<(), NetError> {
        if !self.connected {
            return Err(NetError::Connect);
        }
        if !self.time_server_up {
            self.wait(timeout.as_millis() as u64, timeout)?;
            return Err(NetError::Timeout);
        }
        self.wait(SNTP_LATENCY_MS, timeout)?;
        self.clock.set_to_host_time();
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.connected {
            debug!("WiFi disconnected");
        }
        self.connected = false;
    }

    async fn provision(&mut self, timeout: Duration) -> Result<(), NetError> {
        self.wait(PROVISIONING_MS, timeout)?;
        self.provisioned = true;
        Ok(())
    }
}

/// Collector that stores accepted batches in a JSON lines file.
pub struct LoopbackCollector {
    clock: VirtualClock,
    sink: PathBuf,
    /// Status answered to every upload
    status: u16,
}

impl LoopbackCollector {
    pub fn new(clock: VirtualClock, sink: PathBuf, status: u16) -> Self {
        Self {
            clock,
            sink,
            status,
        }
    }

    /// Check one upload body and answer with the configured status.
    fn serve(&self, body: &[u8]) -> u16 {
        match self.accept(body) {
            Ok(readouts) if self.status == 201 => {
                info!("Collector stored {} readouts", readouts);
                201
            }
            Ok(_) => self.status,
            Err(reason) => {
                warn!("Collector rejected request: {}", reason);
                400
            }
        }
    }

    fn accept(&self, body: &[u8]) -> Result<usize, &'static str> {
        let readouts: Vec<serde_json::Value> =
            serde_json::from_slice(body).map_err(|_| "body is not a JSON array")?;

        if self.status == 201 {
            let mut sink = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.sink)
                .map_err(|_| "sink not writable")?;
            for readout in &readouts {
                writeln!(sink, "{}", readout).map_err(|_| "sink not writable")?;
            }
        }

        Ok(readouts.len())
    }
}

impl Uploader for LoopbackCollector {
    async fn post(
        &mut self,
        endpoint: &Endpoint,
        body: &[u8],
        timeout: Duration,
    ) -> Result<u16, NetError> {
        if u128::from(UPLOAD_LATENCY_MS) > timeout.as_millis() {
            return Err(NetError::Timeout);
        }
        self.clock.advance(UPLOAD_LATENCY_MS);

        debug!("POST {} ({} bytes)", endpoint, body.len());

        Ok(self.serve(body))
    }
}
