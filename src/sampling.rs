//! Sensor scheduler
//!
//! Decides which channels are due in this wake cycle, reads each due sensor
//! exactly once and appends the reading to the channel's log. Channels are
//! independent of each other: a failed read or a dropped append only costs
//! that channel's sample.

use log::{debug, warn};

use crate::sensors::{Sensor, SensorChannel};
use crate::storage::{LogMedium, ReadoutLog, StorageError};
use crate::time::{Clock, elapsed_ms};

/// What happened to the channels in one sampling pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SamplingReport {
    /// Readings appended to a log
    pub sampled: usize,
    /// Channels not due this cycle
    pub skipped: usize,
    pub failed_reads: usize,
    /// Readings lost because the log medium refused them
    pub dropped_appends: usize,
    pub last_append_error: Option<StorageError>,
}

impl SamplingReport {
    pub fn has_faults(&self) -> bool {
        self.failed_reads > 0 || self.dropped_appends > 0
    }
}

/// Sample every channel due in the cycle numbered `boot_count`.
///
/// Offsets are taken against `epoch_ms` at the moment each sensor returns,
/// clamped to zero if the wall clock has not moved past the epoch.
pub async fn sample_due<S, M, C>(
    channels: &mut [SensorChannel<S>],
    boot_count: u32,
    epoch_ms: i64,
    clock: &C,
    log: &mut ReadoutLog<M>,
) -> SamplingReport
where
    S: Sensor,
    M: LogMedium,
    C: Clock,
{
    let mut report = SamplingReport::default();

    for channel in channels.iter_mut() {
        if !channel.is_due(boot_count) {
            debug!("{}: not due in cycle {}", channel.code(), boot_count);
            report.skipped += 1;
            continue;
        }

        let value = match channel.sensor_mut().read().await {
            Ok(value) => value,
            Err(e) => {
                warn!("{}: read failed, no sample this cycle: {}", channel.code(), e);
                report.failed_reads += 1;
                continue;
            }
        };

        let offset = elapsed_ms(epoch_ms, clock.now_ms());
        match log.append(channel.code(), offset, value) {
            Ok(()) => report.sampled += 1,
            Err(e) => {
                report.dropped_appends += 1;
                report.last_append_error = Some(e);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{ChannelCode, SensorError};
    use crate::storage::{MemoryMedium, ReadoutRecord};
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use embassy_futures::block_on;

    struct FixedClock(Cell<i64>);

    impl Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0.get()
        }

        fn uptime_ms(&self) -> u64 {
            0
        }
    }

    enum Fake {
        Value(i32),
        Broken,
    }

    impl Sensor for Fake {
        async fn read(&mut self) -> Result<i32, SensorError> {
            match self {
                Self::Value(v) => Ok(*v),
                Self::Broken => Err(SensorError::Timeout {
                    sensor: "fake",
                    operation: "measure",
                }),
            }
        }
    }

    fn mounted_log() -> ReadoutLog<MemoryMedium> {
        let mut log = ReadoutLog::new(MemoryMedium::new());
        log.mount().unwrap();
        log
    }

    fn code(s: &str) -> ChannelCode {
        ChannelCode::new(s).unwrap()
    }

    #[test]
    fn cadence_two_samples_on_even_cycles() {
        let mut channels = vec![SensorChannel::new("TMP", 2, Fake::Value(2_137)).unwrap()];
        let mut log = mounted_log();
        let clock = FixedClock(Cell::new(0));

        let sampled: Vec<usize> = (1..=4)
            .map(|boot| block_on(sample_due(&mut channels, boot, 0, &clock, &mut log)).sampled)
            .collect();

        assert_eq!(sampled, [0, 1, 0, 1]);
        assert_eq!(log.count(&code("TMP")), 2);
    }

    #[test]
    fn offset_is_measured_from_the_epoch() {
        let mut channels = vec![SensorChannel::new("LUM", 1, Fake::Value(812)).unwrap()];
        let mut log = mounted_log();
        let clock = FixedClock(Cell::new(45_300));

        block_on(sample_due(&mut channels, 1, 40_000, &clock, &mut log));

        assert_eq!(
            log.read_all(&code("LUM")).unwrap(),
            vec![ReadoutRecord::new(5_300, 812)]
        );
    }

    #[test]
    fn stalled_clock_clamps_to_zero() {
        let mut channels = vec![SensorChannel::new("LUM", 1, Fake::Value(1)).unwrap()];
        let mut log = mounted_log();
        let clock = FixedClock(Cell::new(1_000));

        block_on(sample_due(&mut channels, 1, 9_000, &clock, &mut log));

        assert_eq!(
            log.read_all(&code("LUM")).unwrap(),
            vec![ReadoutRecord::new(0, 1)]
        );
    }

    #[test]
    fn a_broken_sensor_does_not_stop_the_others() {
        let mut channels = vec![
            SensorChannel::new("TMP", 1, Fake::Broken).unwrap(),
            SensorChannel::new("LUM", 1, Fake::Value(812)).unwrap(),
            SensorChannel::new("FER", 3, Fake::Value(40)).unwrap(),
        ];
        let mut log = mounted_log();
        let clock = FixedClock(Cell::new(0));

        let report = block_on(sample_due(&mut channels, 1, 0, &clock, &mut log));

        assert_eq!(
            report,
            SamplingReport {
                sampled: 1,
                skipped: 1,
                failed_reads: 1,
                dropped_appends: 0,
                last_append_error: None,
            }
        );
        assert_eq!(log.count(&code("TMP")), 0);
        assert_eq!(log.count(&code("LUM")), 1);
    }

    #[test]
    fn full_medium_is_reported_not_raised() {
        let mut channels = vec![SensorChannel::new("TMP", 1, Fake::Value(1)).unwrap()];
        let mut log = ReadoutLog::new(MemoryMedium::with_capacity(2));
        log.mount().unwrap();
        let clock = FixedClock(Cell::new(0));

        let report = block_on(sample_due(&mut channels, 1, 0, &clock, &mut log));

        assert_eq!(report.dropped_appends, 1);
        assert_eq!(report.last_append_error, Some(StorageError::Full));
        assert!(report.has_faults());
    }
}
