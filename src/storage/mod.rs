//! Durable per-channel readout logs
//!
//! Each channel owns one plain-text file on the log medium (`<CODE>.TXT`).
//! Records are appended as `"<offset_ms> <value>\n"` lines and stay there
//! until a sync confirms delivery or a cold boot invalidates their time base.
//!
//! ## Power-loss behaviour
//!
//! A power cut in the middle of an append leaves an unterminated final line.
//! Readers treat it as "no further record". If later appends are glued onto
//! such a fragment, the merged line fails to parse and is skipped, so only the
//! torn record and the one written right after it are lost.

pub mod memory;
pub mod readout_log;

pub use memory::MemoryMedium;
pub use readout_log::ReadoutLog;

extern crate alloc;
use alloc::vec::Vec;

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("log medium is not mounted")]
    NotMounted,
    #[error("log file does not exist")]
    NotFound,
    #[error("log medium is full")]
    Full,
    #[error("log medium I/O fault")]
    Io,
}

/// File-like non-volatile storage keyed by file name.
///
/// Implementations are blocking; an SD card or flash filesystem on the
/// device, a directory on the desktop, or RAM in tests.
pub trait LogMedium {
    fn mount(&mut self) -> Result<(), StorageError>;

    fn unmount(&mut self);

    /// Append `bytes` to `name`, creating the file if needed.
    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Append the whole content of `name` to `out`.
    ///
    /// A missing file is reported as [`StorageError::NotFound`].
    fn read_to_end(&mut self, name: &str, out: &mut Vec<u8>) -> Result<(), StorageError>;

    /// Delete `name`. A missing file is reported as [`StorageError::NotFound`].
    fn remove(&mut self, name: &str) -> Result<(), StorageError>;
}

/// One persisted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadoutRecord {
    /// Milliseconds between the cycle epoch and the moment of sampling
    pub relative_offset_ms: u64,
    /// Fixed-point encoded measurement
    pub value: i32,
}

impl ReadoutRecord {
    pub const fn new(relative_offset_ms: u64, value: i32) -> Self {
        Self {
            relative_offset_ms,
            value,
        }
    }
}
