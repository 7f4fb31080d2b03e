//! Upload batches
//!
//! A batch is the transient, absolute-time view of one channel's log: every
//! record's offset is added to the cycle epoch, and the result is rendered as
//! the JSON array the collector expects.

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;
use thiserror_no_std::Error;

use crate::sensors::ChannelCode;
use crate::storage::ReadoutRecord;
use crate::time::format_local;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    #[error("readout timestamp is out of range")]
    TimestampOutOfRange,
    #[error("failed to serialize batch")]
    Serialize,
}

/// One readout placed on the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchEntry {
    pub timestamp_ms: i64,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBatch<'a> {
    code: &'a ChannelCode,
    entries: Vec<BatchEntry>,
}

#[derive(Serialize)]
struct ReadoutJson<'a> {
    device: &'a str,
    timestamp: String,
    sensor_type: &'a str,
    value: i32,
}

impl<'a> UploadBatch<'a> {
    /// Place every record of `code` at `epoch_ms + relative_offset_ms`,
    /// keeping log order.
    pub fn build(
        epoch_ms: i64,
        code: &'a ChannelCode,
        records: &[ReadoutRecord],
    ) -> Result<Self, BatchError> {
        let entries = records
            .iter()
            .map(|record| {
                let timestamp_ms = i64::try_from(record.relative_offset_ms)
                    .ok()
                    .and_then(|offset| epoch_ms.checked_add(offset))
                    .ok_or(BatchError::TimestampOutOfRange)?;

                Ok(BatchEntry {
                    timestamp_ms,
                    value: record.value,
                })
            })
            .collect::<Result<Vec<_>, BatchError>>()?;

        Ok(Self { code, entries })
    }

    pub fn code(&self) -> &ChannelCode {
        self.code
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the batch as a JSON array with timestamps in local time.
    pub fn to_json(&self, device_id: &str, utc_offset_secs: i32) -> Result<Vec<u8>, BatchError> {
        let readouts = self
            .entries
            .iter()
            .map(|entry| {
                Ok(ReadoutJson {
                    device: device_id,
                    timestamp: format_local(entry.timestamp_ms, utc_offset_secs)
                        .ok_or(BatchError::TimestampOutOfRange)?,
                    sensor_type: self.code.as_str(),
                    value: entry.value,
                })
            })
            .collect::<Result<Vec<_>, BatchError>>()?;

        serde_json::to_vec(&readouts).map_err(|_| BatchError::Serialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-11-14T22:13:20Z
    const T0: i64 = 1_700_000_000_000;

    fn tmp() -> ChannelCode {
        ChannelCode::new("TMP").unwrap()
    }

    #[test]
    fn offsets_are_added_to_the_epoch() {
        let code = tmp();
        let records = [ReadoutRecord::new(5_000, 2_137)];

        let batch = UploadBatch::build(T0, &code, &records).unwrap();

        assert_eq!(batch.entries()[0].timestamp_ms, T0 + 5_000);
        assert_eq!(
            batch.to_json("node-1", 0).unwrap(),
            br#"[{"device":"node-1","timestamp":"2023-11-14T22:13:25","sensor_type":"TMP","value":2137}]"#
        );
    }

    #[test]
    fn keeps_log_order() {
        let code = tmp();
        let records = [
            ReadoutRecord::new(30_000, 3),
            ReadoutRecord::new(10_000, 1),
            ReadoutRecord::new(20_000, 2),
        ];

        let batch = UploadBatch::build(T0, &code, &records).unwrap();

        let values: Vec<i32> = batch.entries().iter().map(|e| e.value).collect();
        assert_eq!(values, [3, 1, 2]);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn local_offset_shifts_the_rendered_time() {
        let code = ChannelCode::new("LUM").unwrap();
        let batch = UploadBatch::build(T0, &code, &[ReadoutRecord::new(0, 812)]).unwrap();

        let json = batch.to_json("node-1", 2 * 3600).unwrap();

        assert_eq!(
            json,
            br#"[{"device":"node-1","timestamp":"2023-11-15T00:13:20","sensor_type":"LUM","value":812}]"#
        );
    }

    #[test]
    fn empty_batch_is_an_empty_array() {
        let code = tmp();
        let batch = UploadBatch::build(T0, &code, &[]).unwrap();

        assert!(batch.is_empty());
        assert_eq!(batch.to_json("node-1", 0).unwrap(), b"[]");
    }

    #[test]
    fn overflowing_offsets_are_rejected() {
        let code = tmp();

        assert_eq!(
            UploadBatch::build(T0, &code, &[ReadoutRecord::new(u64::MAX, 0)]),
            Err(BatchError::TimestampOutOfRange)
        );
        assert_eq!(
            UploadBatch::build(i64::MAX, &code, &[ReadoutRecord::new(1, 0)]),
            Err(BatchError::TimestampOutOfRange)
        );
    }
}
