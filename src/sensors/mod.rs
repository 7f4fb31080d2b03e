//! Sensor channels and the capability every physical sensor implements
//!
//! A [`SensorChannel`] pairs one [`Sensor`] with the short code that keys its
//! readout log and upload payload, and with the cadence that decides which
//! wake cycles sample it.

use core::fmt::Display;
use core::num::NonZeroU32;
use core::str::FromStr;

use thiserror_no_std::Error;

use crate::config::ConfigError;
use crate::cycle;

/// Longest channel code; codes double as 8.3 file stems on the log medium.
pub const MAX_CHANNEL_CODE_LEN: usize = 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: {operation} failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: timed out waiting for {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: initialization failed ({details})")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: measurement cannot be encoded as fixed point")]
    OutOfRange { sensor: &'static str },
}

/// A sensor that yields one fixed-point integer per read.
///
/// Fractional quantities are scaled by the implementation (for example
/// centi-degrees Celsius), never by the scheduler or the batch builder.
pub trait Sensor {
    /// Take a single measurement.
    fn read(&mut self) -> impl Future<Output = Result<i32, SensorError>>;
}

/// Scale a floating point measurement to a fixed-point integer.
///
/// Returns `None` for NaN or values that do not fit in an `i32` after scaling.
pub fn fixed_point(value: f32, scale: f32) -> Option<i32> {
    let scaled = value * scale;
    if scaled.is_nan() || scaled >= i32::MAX as f32 || scaled <= i32::MIN as f32 {
        return None;
    }
    Some(scaled as i32)
}

/// Short identifier of a channel, e.g. `TMP` or `LUM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCode(heapless::String<MAX_CHANNEL_CODE_LEN>);

impl ChannelCode {
    pub fn new(code: &str) -> Result<Self, ConfigError> {
        let valid = !code.is_empty()
            && code.len() <= MAX_CHANNEL_CODE_LEN
            && code.bytes().all(|b| b.is_ascii_alphanumeric());
        if !valid {
            return Err(ConfigError::InvalidChannelCode);
        }

        heapless::String::from_str(code)
            .map(Self)
            .map_err(|_| ConfigError::InvalidChannelCode)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ChannelCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static descriptor of one physical sensor.
pub struct SensorChannel<S> {
    code: ChannelCode,
    cadence: NonZeroU32,
    sensor: S,
}

impl<S: Sensor> SensorChannel<S> {
    /// Describe a channel sampled on every `cadence`-th wake cycle.
    pub fn new(code: &str, cadence: u32, sensor: S) -> Result<Self, ConfigError> {
        let code = ChannelCode::new(code)?;
        let cadence = NonZeroU32::new(cadence).ok_or(ConfigError::ZeroCadence)?;

        Ok(Self {
            code,
            cadence,
            sensor,
        })
    }

    pub fn code(&self) -> &ChannelCode {
        &self.code
    }

    pub fn cadence(&self) -> NonZeroU32 {
        self.cadence
    }

    /// Whether this channel is sampled in the cycle numbered `boot_count`.
    pub fn is_due(&self, boot_count: u32) -> bool {
        cycle::is_due(boot_count, self.cadence)
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}

/// Reject channel lists that reuse a code.
pub fn ensure_unique_codes<S>(channels: &[SensorChannel<S>]) -> Result<(), ConfigError> {
    for (i, channel) in channels.iter().enumerate() {
        if channels[..i].iter().any(|other| other.code == channel.code) {
            return Err(ConfigError::DuplicateChannel(channel.code.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(i32);

    impl Sensor for Constant {
        async fn read(&mut self) -> Result<i32, SensorError> {
            Ok(self.0)
        }
    }

    #[test]
    fn channel_codes_are_short_alphanumerics() {
        assert!(ChannelCode::new("TMP").is_ok());
        assert!(ChannelCode::new("SOIL1").is_ok());
        assert_eq!(ChannelCode::new(""), Err(ConfigError::InvalidChannelCode));
        assert_eq!(
            ChannelCode::new("TOOLONGCODE"),
            Err(ConfigError::InvalidChannelCode)
        );
        assert_eq!(ChannelCode::new("A/B"), Err(ConfigError::InvalidChannelCode));
    }

    #[test]
    fn zero_cadence_is_rejected() {
        assert!(matches!(
            SensorChannel::new("TMP", 0, Constant(1)),
            Err(ConfigError::ZeroCadence)
        ));
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let channels = [
            SensorChannel::new("TMP", 1, Constant(1)).unwrap(),
            SensorChannel::new("LUM", 1, Constant(2)).unwrap(),
            SensorChannel::new("TMP", 3, Constant(3)).unwrap(),
        ];

        match ensure_unique_codes(&channels) {
            Err(ConfigError::DuplicateChannel(code)) => assert_eq!(code.as_str(), "TMP"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(ensure_unique_codes(&channels[..2]).is_ok());
    }

    #[test]
    fn fixed_point_scales_and_rejects_nan() {
        assert_eq!(fixed_point(21.37, 100.0), Some(2137));
        assert_eq!(fixed_point(-4.5, 10.0), Some(-45));
        assert_eq!(fixed_point(f32::NAN, 100.0), None);
        assert_eq!(fixed_point(1.0e12, 1000.0), None);
    }
}
