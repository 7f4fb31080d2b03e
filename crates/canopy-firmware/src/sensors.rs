//! Physical sensors behind the node's channels
//!
//! Every channel needs its own [`Sensor`], so the SHT40 appears twice (one
//! handle per quantity) and each read takes its own measurement. Channels
//! are held in one `Vec`, hence the enum instead of trait objects.

use canopy::sensors::{Sensor, SensorError, fixed_point};
use embedded_hal_async::i2c::I2c;
use log::{debug, error};

#[cfg(feature = "sensor-bh1750")]
use bh1750_embedded::{Address, Resolution, r#async::Bh1750Async};
#[cfg(feature = "sensor-sht40")]
use sht4x::Sht4xAsync;

/// Temperature and humidity are stored in hundredths.
const CENTI: f32 = 100.0;

#[cfg(feature = "sensor-sht40")]
#[derive(Debug, Clone, Copy)]
pub enum Sht40Quantity {
    Temperature,
    Humidity,
}

#[cfg(feature = "sensor-sht40")]
pub struct Sht40Channel<I> {
    sensor: Sht4xAsync<I, embassy_time::Delay>,
    quantity: Sht40Quantity,
}

#[cfg(feature = "sensor-sht40")]
impl<I: I2c> Sht40Channel<I> {
    pub fn new(i2c: I, quantity: Sht40Quantity) -> Self {
        Self {
            sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
            quantity,
        }
    }

    async fn read(&mut self) -> Result<i32, SensorError> {
        let measurement = self
            .sensor
            .measure(sht4x::Precision::High, &mut embassy_time::Delay)
            .await
            .map_err(|e| {
                error!("SHT40 measurement failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: "SHT40",
                    operation: "measure",
                    details: "I2C communication error or sensor not responding",
                }
            })?;

        let value = match self.quantity {
            Sht40Quantity::Temperature => measurement.temperature_celsius().to_num::<f32>(),
            Sht40Quantity::Humidity => measurement.humidity_percent().to_num::<f32>(),
        };
        debug!("SHT40 {:?}: {}", self.quantity, value);

        fixed_point(value, CENTI).ok_or(SensorError::OutOfRange { sensor: "SHT40" })
    }
}

#[cfg(feature = "sensor-bh1750")]
pub struct Bh1750Channel<I> {
    sensor: Bh1750Async<I, embassy_time::Delay>,
}

#[cfg(feature = "sensor-bh1750")]
impl<I: I2c> Bh1750Channel<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Bh1750Async::<I, embassy_time::Delay>::new(
                i2c,
                embassy_time::Delay,
                Address::Low,
            ),
        }
    }

    async fn read(&mut self) -> Result<i32, SensorError> {
        let lux = self
            .sensor
            .one_time_measurement(Resolution::High)
            .await
            .map_err(|e| {
                error!("BH1750 one_time_measurement failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: "BH1750",
                    operation: "one_time_measurement",
                    details: "no lux value from a one-time measurement",
                }
            })?;
        debug!("BH1750: {} lx", lux);

        // Whole lux
        fixed_point(lux, 1.0).ok_or(SensorError::OutOfRange { sensor: "BH1750" })
    }
}

pub enum NodeSensor<I> {
    #[cfg(feature = "sensor-sht40")]
    Sht40(Sht40Channel<I>),
    #[cfg(feature = "sensor-bh1750")]
    Bh1750(Bh1750Channel<I>),
    #[cfg(not(any(feature = "sensor-sht40", feature = "sensor-bh1750")))]
    None(core::marker::PhantomData<I>),
}

impl<I: I2c> Sensor for NodeSensor<I> {
    async fn read(&mut self) -> Result<i32, SensorError> {
        match self {
            #[cfg(feature = "sensor-sht40")]
            Self::Sht40(sensor) => sensor.read().await,
            #[cfg(feature = "sensor-bh1750")]
            Self::Bh1750(sensor) => sensor.read().await,
            #[cfg(not(any(feature = "sensor-sht40", feature = "sensor-bh1750")))]
            Self::None(_) => Err(SensorError::InitializationFailed {
                sensor: "none",
                details: "firmware built without sensor drivers",
            }),
        }
    }
}
