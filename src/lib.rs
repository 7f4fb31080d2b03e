//! Hardware-independent core of the canopy sensor node
//!
//! Everything that decides *what* the node does in a wake cycle lives here:
//! the persistent cycle counter, the per-channel readout logs, the sampling
//! scheduler, the sync pipeline with its batch builder and reconciler, and the
//! lifecycle controller that strings them together before the device goes back
//! to deep sleep.
//!
//! Hardware is reached only through the traits in [`sensors`], [`storage`],
//! [`net`], [`time`], [`cycle`] and [`lifecycle`], so the crate builds for the
//! ESP32-S3 firmware and for desktop hosts (the simulator and the tests).

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod config;
pub mod cycle;
pub mod http;
pub mod indicator;
pub mod lifecycle;
pub mod net;
pub mod sampling;
pub mod sensors;
pub mod storage;
pub mod sync;
pub mod time;
