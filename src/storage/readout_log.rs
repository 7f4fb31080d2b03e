use core::fmt::Write;

extern crate alloc;
use alloc::vec::Vec;

use log::{debug, error, warn};

use super::{LogMedium, ReadoutRecord, StorageError};
use crate::sensors::{ChannelCode, MAX_CHANNEL_CODE_LEN};

/// Longest encoded record: `u64::MAX`, a space, `i32::MIN` and a newline.
const MAX_LINE_LEN: usize = 40;

type FileName = heapless::String<{ MAX_CHANNEL_CODE_LEN + 4 }>;

/// Log file name for a channel, e.g. `TMP.TXT`.
pub fn file_name(code: &ChannelCode) -> FileName {
    let mut name = FileName::new();
    // Codes are at most 8 characters, so the 8.3 name always fits.
    let _ = write!(name, "{}.TXT", code);
    name
}

/// Per-channel append-only readout logs on top of a [`LogMedium`].
pub struct ReadoutLog<M> {
    medium: M,
    mounted: bool,
}

impl<M: LogMedium> ReadoutLog<M> {
    pub fn new(medium: M) -> Self {
        Self {
            medium,
            mounted: false,
        }
    }

    pub fn mount(&mut self) -> Result<(), StorageError> {
        self.medium.mount()?;
        self.mounted = true;
        Ok(())
    }

    pub fn unmount(&mut self) {
        if self.mounted {
            self.medium.unmount();
            self.mounted = false;
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Durably append one record.
    ///
    /// A failed write is logged and the record is dropped; the caller only
    /// gets the error back for reporting, there is no retry.
    pub fn append(
        &mut self,
        code: &ChannelCode,
        relative_offset_ms: u64,
        value: i32,
    ) -> Result<(), StorageError> {
        let mut line = heapless::String::<MAX_LINE_LEN>::new();
        writeln!(line, "{} {}", relative_offset_ms, value).map_err(|_| StorageError::Io)?;

        self.medium
            .append(&file_name(code), line.as_bytes())
            .inspect(|_| debug!("{}: stored {} at +{} ms", code, value, relative_offset_ms))
            .inspect_err(|e| error!("{}: dropping readout {}: {}", code, value, e))
    }

    /// Number of valid records buffered for `code`.
    ///
    /// Never fails: an unreadable log counts as empty.
    pub fn count(&mut self, code: &ChannelCode) -> usize {
        match self.read_all(code) {
            Ok(records) => records.len(),
            Err(e) => {
                warn!("{}: cannot count readouts: {}", code, e);
                0
            }
        }
    }

    /// All valid records for `code` in insertion order.
    pub fn read_all(&mut self, code: &ChannelCode) -> Result<Vec<ReadoutRecord>, StorageError> {
        let mut bytes = Vec::new();
        match self.medium.read_to_end(&file_name(code), &mut bytes) {
            Ok(()) => Ok(parse_records(code, &bytes)),
            Err(StorageError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Remove every record of `code`. Purging an empty log is a no-op.
    pub fn purge(&mut self, code: &ChannelCode) -> Result<(), StorageError> {
        match self.medium.remove(&file_name(code)) {
            Ok(()) | Err(StorageError::NotFound) => Ok(()),
            Err(e) => {
                error!("{}: failed to purge readouts: {}", code, e);
                Err(e)
            }
        }
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    pub fn medium_mut(&mut self) -> &mut M {
        &mut self.medium
    }

    pub fn into_inner(self) -> M {
        self.medium
    }
}

fn parse_records(code: &ChannelCode, bytes: &[u8]) -> Vec<ReadoutRecord> {
    let mut records = Vec::new();
    let mut rest = bytes;

    while let Some(end) = rest.iter().position(|&b| b == b'\n') {
        let line = &rest[..end];
        rest = &rest[end + 1..];

        match parse_line(line) {
            Some(record) => records.push(record),
            None => warn!("{}: skipping malformed readout line", code),
        }
    }

    if !rest.is_empty() {
        warn!(
            "{}: ignoring {} bytes of an unterminated readout line",
            code,
            rest.len()
        );
    }

    records
}

fn parse_line(line: &[u8]) -> Option<ReadoutRecord> {
    let text = core::str::from_utf8(line).ok()?;
    let mut fields = text.split_ascii_whitespace();

    let offset = fields.next()?.parse().ok()?;
    let value = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }

    Some(ReadoutRecord::new(offset, value))
}
