//! Synthetic sensors that follow slow daily-looking curves.

use canopy::sensors::{Sensor, SensorError, fixed_point};
use canopy::time::Clock;

use crate::hardware::VirtualClock;

#[derive(Debug, Clone, Copy)]
pub enum Quantity {
    /// Centi-degrees Celsius
    Temperature,
    /// Centi-percent relative humidity
    Humidity,
    /// Lux
    Light,
}

pub struct SynthSensor {
    quantity: Quantity,
    clock: VirtualClock,
    /// Fail every n-th read, to exercise the fault path
    fail_every: Option<u32>,
    reads: u32,
}

impl SynthSensor {
    pub fn new(quantity: Quantity, clock: VirtualClock) -> Self {
        Self {
            quantity,
            clock,
            fail_every: None,
            reads: 0,
        }
    }

    pub fn failing_every(mut self, n: u32) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    fn value_at(&self, t_secs: f64) -> (f32, f32) {
        match self.quantity {
            Quantity::Temperature => (
                (21.0 + 4.0 * (t_secs / 3_600.0).sin() + 0.3 * (t_secs / 97.0).cos()) as f32,
                100.0,
            ),
            Quantity::Humidity => (
                (55.0 + 12.0 * (t_secs / 5_400.0).sin() + 1.5 * (t_secs / 61.0).cos()) as f32,
                100.0,
            ),
            Quantity::Light => ((400.0 + 380.0 * (t_secs / 7_200.0).sin()) as f32, 1.0),
        }
    }

    fn name(&self) -> &'static str {
        match self.quantity {
            Quantity::Temperature => "synthetic temperature",
            Quantity::Humidity => "synthetic humidity",
            Quantity::Light => "synthetic light",
        }
    }
}

impl Sensor for SynthSensor {
    async fn read(&mut self) -> Result<i32, SensorError> {
        self.reads += 1;
        if self.fail_every.is_some_and(|n| self.reads % n == 0) {
            return Err(SensorError::Timeout {
                sensor: self.name(),
                operation: "measurement",
            });
        }

        // Conversion time of a real sensor
        self.clock.advance(10);

        let t_secs = self.clock.now_ms() as f64 / 1_000.0;
        let (value, scale) = self.value_at(t_secs);
        fixed_point(value, scale).ok_or(SensorError::OutOfRange {
            sensor: self.name(),
        })
    }
}
