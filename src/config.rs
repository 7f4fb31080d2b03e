use core::num::NonZeroU32;
use core::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::sensors::ChannelCode;
use crate::sync::retry::RetryPolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("channel code must be 1-8 ASCII letters or digits")]
    InvalidChannelCode,
    #[error("cadence must be at least 1")]
    ZeroCadence,
    #[error("channel {0} is configured more than once")]
    DuplicateChannel(ChannelCode),
    #[error("collector url must look like http://host[:port]/path")]
    InvalidUrl,
    #[error("utc offset {0} s is outside +/-14 h")]
    InvalidUtcOffset(i32),
}

/// Widest offset in use by any time zone.
pub const MAX_UTC_OFFSET_SECS: i32 = 14 * 3600;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(bound(deserialize = "'de: 'a"), default)]
pub struct NodeConfig<'a> {
    /// Identity reported in every uploaded readout
    pub device_id: &'a str,
    /// Where readout batches are POSTed
    pub collector_url: &'a str,
    pub internet: InternetConfig<'a>,
    pub schedule: ScheduleConfig,
    pub timeouts: TimeoutConfig,
    /// Offset applied when rendering upload timestamps as local time
    pub utc_offset_secs: i32,
    /// Status code the collector answers with when it stored a batch
    pub delivered_status: u16,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Length of one deep sleep
    pub sleep_interval_secs: u32,
    /// Sync on every n-th wake cycle
    pub sync_cadence: u32,
    /// RTC-capable GPIO used for manual override wakes
    pub ext_wake_pin: Option<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: u32,
    pub provisioning_ms: u32,
    /// Per-attempt bound of the time acquisition handshake
    pub time_attempt_ms: u32,
    pub upload_ms: u32,
    pub connect_retry: RetryPolicy,
    pub time_retry: RetryPolicy,
    pub upload_retry: RetryPolicy,
}

impl Default for NodeConfig<'_> {
    fn default() -> Self {
        Self {
            device_id: "",
            collector_url: "",
            internet: InternetConfig::default(),
            schedule: ScheduleConfig::default(),
            timeouts: TimeoutConfig::default(),
            utc_offset_secs: 0,
            delivered_status: 201,
        }
    }
}

impl NodeConfig<'_> {
    /// Check the values the wake cycle divides by or parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schedule.sync_cadence()?;
        crate::http::Endpoint::parse(self.collector_url)?;
        if self.utc_offset_secs.abs() > MAX_UTC_OFFSET_SECS {
            return Err(ConfigError::InvalidUtcOffset(self.utc_offset_secs));
        }
        Ok(())
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sleep_interval_secs: 10,
            sync_cadence: 2,
            ext_wake_pin: Some(25),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 30_000,
            provisioning_ms: 60_000,
            time_attempt_ms: 2_000,
            upload_ms: 20_000,
            connect_retry: RetryPolicy::once(),
            time_retry: RetryPolicy::new(10, 2_000),
            upload_retry: RetryPolicy::new(2, 4_000),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms as u64)
    }

    pub fn provisioning(&self) -> Duration {
        Duration::from_millis(self.provisioning_ms as u64)
    }

    pub fn time_attempt(&self) -> Duration {
        Duration::from_millis(self.time_attempt_ms as u64)
    }

    pub fn upload(&self) -> Duration {
        Duration::from_millis(self.upload_ms as u64)
    }
}

impl ScheduleConfig {
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_interval_secs as u64)
    }

    pub fn sync_cadence(&self) -> Result<NonZeroU32, ConfigError> {
        NonZeroU32::new(self.sync_cadence).ok_or(ConfigError::ZeroCadence)
    }
}
