//! One async I2C bus shared by every sensor channel
//!
//! The SHT40 backs two channels and the BH1750 a third; each channel owns an
//! [`I2cDevice`] handle and takes the bus lock only for the duration of one
//! transaction, awaiting it instead of blocking inside a critical section.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

pub type SharedI2c<T> = Mutex<CriticalSectionRawMutex, T>;

#[derive(Clone, Copy)]
pub struct I2cDevice<'a, T> {
    bus: &'a SharedI2c<T>,
}

impl<'a, T> I2cDevice<'a, T> {
    pub const fn new(bus: &'a SharedI2c<T>) -> Self {
        Self { bus }
    }
}

impl<T: ErrorType> ErrorType for I2cDevice<'_, T> {
    type Error = T::Error;
}

impl<T: I2c> I2c for I2cDevice<'_, T> {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}
