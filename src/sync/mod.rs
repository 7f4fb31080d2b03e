//! Sync pipeline
//!
//! On sync cycles the node connects, makes sure the wall clock is absolute,
//! re-anchors the cycle epoch on it and then uploads one batch per channel
//! with buffered readouts. Channels are independent: one channel's failure
//! neither blocks nor rolls back another's purge.

pub mod batch;
pub mod reconcile;
pub mod retry;

use alloc::vec::Vec;
use core::num::NonZeroU32;

use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

use crate::config::NodeConfig;
use crate::cycle::{self, CycleState, RetainedStore, WakeState};
use crate::http::Endpoint;
use crate::net::{NetError, Network, Uploader};
use crate::sensors::ChannelCode;
use crate::storage::{LogMedium, ReadoutLog, StorageError};
use crate::time::{Clock, elapsed_ms, is_absolute};

use batch::UploadBatch;
use reconcile::{ChannelOutcome, FailureReason, reconcile};

/// Whether the cycle numbered `boot_count` synchronizes.
pub fn should_sync(boot_count: u32, sync_cadence: NonZeroU32) -> bool {
    cycle::is_due(boot_count, sync_cadence)
}

/// Why a sync stopped before any upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAbort {
    /// No WiFi credentials; the user has to provision the node first
    NotProvisioned,
    Connect(NetError),
    /// The wall clock could not be set to an absolute time
    TimeUnavailable(NetError),
}

/// Upload result of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSync {
    pub code: ChannelCode,
    /// Records in the batch that was attempted
    pub records: usize,
    pub outcome: ChannelOutcome,
    /// The batch was delivered but its log could not be purged, so the same
    /// records go out again on the next sync
    pub purge_error: Option<StorageError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    Aborted(SyncAbort),
    Completed {
        /// Re-anchored epoch the batches were built against
        epoch_ms: i64,
        /// Channels that had readouts to send; empty ones are left out
        channels: Vec<ChannelSync>,
    },
}

impl SyncReport {
    pub fn delivered(&self) -> usize {
        match self {
            Self::Aborted(_) => 0,
            Self::Completed { channels, .. } => channels
                .iter()
                .filter(|c| c.outcome == ChannelOutcome::Delivered)
                .count(),
        }
    }
}

/// Everything a sync needs besides the log and the cycle state.
pub struct SyncSession<'a, N, U, D> {
    pub config: &'a NodeConfig<'a>,
    pub endpoint: &'a Endpoint,
    pub network: &'a mut N,
    pub uploader: &'a mut U,
    pub delay: &'a mut D,
}

impl<'a, N, U, D> SyncSession<'a, N, U, D>
where
    N: Network,
    U: Uploader,
    D: DelayNs,
{
    /// Run one sync. The network is disconnected afterwards whatever happened.
    pub async fn run<'c, M, C, R>(
        self,
        codes: impl IntoIterator<Item = &'c ChannelCode>,
        wake: &WakeState,
        state: &mut CycleState,
        log: &mut ReadoutLog<M>,
        clock: &C,
        retained: &mut R,
    ) -> SyncReport
    where
        M: LogMedium,
        C: Clock,
        R: RetainedStore,
    {
        let SyncSession {
            config,
            endpoint,
            network,
            uploader,
            delay,
        } = self;

        let report = match connect_and_set_clock(config, network, delay, clock).await {
            Err(abort) => {
                warn!("Sync aborted: {:?}", abort);
                SyncReport::Aborted(abort)
            }
            Ok(()) => {
                state.sleep_enter_time = reanchored_epoch(state.sleep_enter_time, wake, clock);
                retained.store(state);
                info!("Epoch anchored at {} ms", state.sleep_enter_time);

                let mut channels = Vec::new();
                for code in codes {
                    if let Some(result) =
                        sync_channel(config, endpoint, uploader, delay, code, state, log).await
                    {
                        channels.push(result);
                    }
                }

                SyncReport::Completed {
                    epoch_ms: state.sleep_enter_time,
                    channels,
                }
            }
        };

        network.disconnect().await;
        report
    }
}

async fn connect_and_set_clock<N, D, C>(
    config: &NodeConfig<'_>,
    network: &mut N,
    delay: &mut D,
    clock: &C,
) -> Result<(), SyncAbort>
where
    N: Network,
    D: DelayNs,
    C: Clock,
{
    let timeouts = &config.timeouts;

    timeouts
        .connect_retry
        .run("wifi connect", delay, async |_| {
            network.connect(timeouts.connect()).await
        })
        .await
        .map_err(|e| match e {
            NetError::NotProvisioned => SyncAbort::NotProvisioned,
            e => SyncAbort::Connect(e),
        })?;

    if is_absolute(clock.now_ms()) {
        return Ok(());
    }

    info!("Wall clock not set, acquiring time");
    timeouts
        .time_retry
        .run("time sync", delay, async |_| {
            match network.acquire_absolute_time(timeouts.time_attempt()).await {
                Ok(()) if is_absolute(clock.now_ms()) => Ok(()),
                Ok(()) => Err(NetError::Timeout),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(SyncAbort::TimeUnavailable)
}

/// Epoch on the now absolute wall clock that keeps every buffered offset.
///
/// The time elapsed since the old epoch is taken from the clock reading at
/// wake plus the monotonic uptime since then, so it survives the clock step.
pub fn reanchored_epoch<C: Clock>(epoch_ms: i64, wake: &WakeState, clock: &C) -> i64 {
    let since_epoch = elapsed_ms(epoch_ms, wake.woke_at_ms)
        .saturating_add(clock.uptime_ms().saturating_sub(wake.woke_at_uptime_ms));

    clock
        .now_ms()
        .saturating_sub(i64::try_from(since_epoch).unwrap_or(i64::MAX))
}

async fn sync_channel<U, D, M>(
    config: &NodeConfig<'_>,
    endpoint: &Endpoint,
    uploader: &mut U,
    delay: &mut D,
    code: &ChannelCode,
    state: &CycleState,
    log: &mut ReadoutLog<M>,
) -> Option<ChannelSync>
where
    U: Uploader,
    D: DelayNs,
    M: LogMedium,
{
    let records = match log.read_all(code) {
        Ok(records) if records.is_empty() => return None,
        Ok(records) => records,
        Err(e) => {
            warn!("{}: cannot read log for upload: {}", code, e);
            return Some(ChannelSync {
                code: code.clone(),
                records: 0,
                outcome: ChannelOutcome::Failed(FailureReason::Storage(e)),
                purge_error: None,
            });
        }
    };

    let body = UploadBatch::build(state.sleep_enter_time, code, &records)
        .and_then(|batch| batch.to_json(config.device_id, config.utc_offset_secs));

    let outcome = match body {
        Err(e) => ChannelOutcome::Failed(FailureReason::Batch(e)),
        Ok(body) => {
            info!("{}: uploading {} readouts ({} bytes)", code, records.len(), body.len());
            let timeouts = &config.timeouts;
            let response = timeouts
                .upload_retry
                .run("upload", delay, async |_| {
                    uploader.post(endpoint, &body, timeouts.upload()).await
                })
                .await;
            ChannelOutcome::from_response(response, config.delivered_status)
        }
    };

    let purge_error = reconcile(log, code, &outcome).err();

    Some(ChannelSync {
        code: code.clone(),
        records: records.len(),
        outcome,
        purge_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::WakeupCause;
    use core::cell::Cell;

    struct StepClock {
        now: Cell<i64>,
        uptime: Cell<u64>,
    }

    impl Clock for StepClock {
        fn now_ms(&self) -> i64 {
            self.now.get()
        }

        fn uptime_ms(&self) -> u64 {
            self.uptime.get()
        }
    }

    fn wake_at(now: i64, uptime: u64) -> WakeState {
        WakeState {
            cause: WakeupCause::TimerWake,
            state: CycleState {
                boot_count: 2,
                sleep_enter_time: 0,
                flush_pending: false,
            },
            fresh_start: false,
            since_epoch_ms: 0,
            woke_at_ms: now,
            woke_at_uptime_ms: uptime,
        }
    }

    #[test]
    fn sync_cadence_gates_cycles() {
        let two = NonZeroU32::new(2).unwrap();
        let synced: Vec<u32> = (1..=6).filter(|&n| should_sync(n, two)).collect();
        assert_eq!(synced, [2, 4, 6]);
    }

    #[test]
    fn epoch_follows_the_clock_step() {
        // Cold boot epoch 0, woke 20 s later on the unset clock; 1.5 s of
        // uptime later NTP stepped the clock to an absolute time.
        let wake = wake_at(20_000, 100);
        let clock = StepClock {
            now: Cell::new(1_700_000_000_000),
            uptime: Cell::new(1_600),
        };

        let epoch = reanchored_epoch(0, &wake, &clock);

        assert_eq!(epoch, 1_700_000_000_000 - 21_500);
    }

    #[test]
    fn absolute_epoch_is_kept() {
        let t0 = 1_700_000_000_000;
        let wake = wake_at(t0 + 10_000, 0);
        let clock = StepClock {
            now: Cell::new(t0 + 10_250),
            uptime: Cell::new(250),
        };

        assert_eq!(reanchored_epoch(t0, &wake, &clock), t0);
    }
}
