//! Status LED
//!
//! The LED is lit for the whole time the node is awake. While it waits for
//! provisioning it blinks, and a successful provisioning ends with three
//! short flashes.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

/// Half period of the "waiting for the user" blink.
pub const BUSY_BLINK_MS: u32 = 700;
/// Half period and repetitions of the success pattern.
pub const SUCCESS_BLINK_MS: u32 = 300;
pub const SUCCESS_BLINKS: u8 = 3;

pub struct StatusLed<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> StatusLed<P, D>
where
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(pin: P, delay: D) -> Self {
        Self { pin, delay }
    }

    // A pin that cannot be driven only costs the indication.
    pub fn on(&mut self) {
        let _ = self.pin.set_high();
    }

    pub fn off(&mut self) {
        let _ = self.pin.set_low();
    }

    /// Blink until the future is dropped.
    ///
    /// Meant to be raced against the work it indicates, so it never returns.
    pub async fn blink_forever(&mut self, half_period_ms: u32) -> Infallible {
        loop {
            self.on();
            self.delay.delay_ms(half_period_ms).await;
            self.off();
            self.delay.delay_ms(half_period_ms).await;
        }
    }

    pub async fn blink_success(&mut self) {
        for _ in 0..SUCCESS_BLINKS {
            self.on();
            self.delay.delay_ms(SUCCESS_BLINK_MS).await;
            self.off();
            self.delay.delay_ms(SUCCESS_BLINK_MS).await;
        }
    }

    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }
}
