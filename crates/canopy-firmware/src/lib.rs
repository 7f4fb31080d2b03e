//! ESP32-S3 side of the canopy sensor node
//!
//! Concrete implementations of the collaborator traits of the `canopy` core:
//! RTC retained memory and wall clock, an SD card log medium, WiFi with SNTP
//! and HTTP uploads over embassy-net, the I2C sensors, and deep sleep.

#![no_std]

extern crate alloc;

pub mod async_i2c_bus;
pub mod power;
pub mod rtc;
pub mod sd_card;
pub mod sensors;
pub mod wifi;
