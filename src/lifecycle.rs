//! Wake/sleep lifecycle controller
//!
//! One call to [`run_cycle`] is one wake of the node: count the wake, light
//! the LED, mount the logs, flush them after a cold boot, sample the due
//! channels, sync when the cadence says so, maintain the epoch, persist the
//! cycle state and arm the next wake. Every failure on the way is logged and
//! collected; the cycle always ends with a [`SleepPlan`] armed.

use alloc::vec;
use alloc::vec::Vec;
use core::time::Duration;

use embassy_futures::select::{Either, select};
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::app_state::{CycleFault, CycleRunState};
use crate::config::{ConfigError, NodeConfig};
use crate::cycle::{self, CycleState, RetainedStore, WakeupCause};
use crate::http::Endpoint;
use crate::indicator::{BUSY_BLINK_MS, StatusLed};
use crate::net::{NetError, Network, Uploader};
use crate::sampling::{SamplingReport, sample_due};
use crate::sensors::{Sensor, SensorChannel};
use crate::storage::{LogMedium, ReadoutLog, StorageError};
use crate::sync::reconcile::ChannelOutcome;
use crate::sync::{SyncAbort, SyncReport, SyncSession, should_sync};
use crate::time::Clock;

/// Wake sources to arm before powering down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    pub timer: Duration,
    /// RTC GPIO that wakes the node when pulled high
    pub ext_wake_pin: Option<u8>,
}

pub trait PowerControl {
    fn arm(&mut self, plan: &SleepPlan);

    /// Power down until one of the armed sources fires. Never returns; the
    /// next wake starts from reset.
    fn deep_sleep(&mut self) -> !;
}

/// Hardware the lifecycle drives, already brought up.
pub struct Board<S, M, N, U, C, R, D, P, L> {
    pub channels: Vec<SensorChannel<S>>,
    pub log: ReadoutLog<M>,
    pub network: N,
    pub uploader: U,
    pub clock: C,
    pub retained: R,
    /// Delay used between network retries
    pub delay: D,
    pub led: StatusLed<P, L>,
}

/// Everything that happened in one wake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cause: WakeupCause,
    /// State persisted at the end of the cycle
    pub state: CycleState,
    pub sampling: Option<SamplingReport>,
    pub sync: Option<SyncReport>,
    /// Outcome of a manual provisioning request
    pub provisioned: Option<bool>,
    pub faults: Vec<CycleFault>,
    pub plan: SleepPlan,
}

struct Progress(CycleRunState);

impl Progress {
    fn enter(&mut self, next: CycleRunState) {
        debug!("Cycle state {:?} -> {:?}", self.0, next);
        self.0 = next;
    }
}

/// Run one wake cycle and arm the next wake.
///
/// Without a valid collector `endpoint` the node still samples and sleeps;
/// only sync cycles are skipped. The caller sends the node to sleep
/// afterwards with [`PowerControl::deep_sleep`].
pub async fn run_cycle<S, M, N, U, C, R, D, P, L, W>(
    cause: WakeupCause,
    config: &NodeConfig<'_>,
    endpoint: Option<&Endpoint>,
    board: &mut Board<S, M, N, U, C, R, D, P, L>,
    power: &mut W,
) -> CycleReport
where
    S: Sensor,
    M: LogMedium,
    N: Network,
    U: Uploader,
    C: Clock,
    R: RetainedStore,
    D: DelayNs,
    P: OutputPin,
    L: DelayNs,
    W: PowerControl,
{
    let mut progress = Progress(CycleRunState::Waking);
    let mut faults = Vec::new();

    let wake = cycle::on_wake(cause, &mut board.retained, &board.clock);
    let mut state = wake.state;
    board.led.on();

    progress.enter(CycleRunState::MountingStorage);
    let mounted = match board.log.mount() {
        Ok(()) => true,
        Err(e) => {
            error!("Log storage unavailable, skipping sampling and sync: {}", e);
            faults.push(CycleFault::StorageMount(e));
            false
        }
    };

    if mounted && state.flush_pending {
        progress.enter(CycleRunState::Flushing);
        match flush(&mut board.log, &board.channels) {
            Ok(()) => {
                info!("Cold boot: buffered readouts flushed");
                state.flush_pending = false;
                faults.push(CycleFault::ColdBootClockDiscontinuity);
            }
            Err(e) => faults.push(CycleFault::StorageIo(e)),
        }
    }

    let mut sampling = None;
    let mut sync = None;
    let mut provisioned = None;

    if cause == WakeupCause::ExternalInterruptWake {
        progress.enter(CycleRunState::Provisioning);
        let ok = provision(config, board).await.map_err(CycleFault::Provisioning);
        if let Err(fault) = &ok {
            faults.push(fault.clone());
        }
        provisioned = Some(ok.is_ok());
    } else if mounted {
        progress.enter(CycleRunState::Sampling);
        let report = sample_due(
            &mut board.channels,
            state.boot_count,
            state.sleep_enter_time,
            &board.clock,
            &mut board.log,
        )
        .await;
        if report.failed_reads > 0 {
            faults.push(CycleFault::SensorRead {
                count: report.failed_reads,
            });
        }
        if let Some(e) = report.last_append_error {
            faults.push(CycleFault::StorageIo(e));
        }
        sampling = Some(report);

        let sync_due = config
            .schedule
            .sync_cadence()
            .map(|cadence| should_sync(state.boot_count, cadence));
        match (sync_due, endpoint) {
            (Ok(true), Some(endpoint)) => {
                progress.enter(CycleRunState::Syncing);
                let session = SyncSession {
                    config,
                    endpoint,
                    network: &mut board.network,
                    uploader: &mut board.uploader,
                    delay: &mut board.delay,
                };
                let report = session
                    .run(
                        board.channels.iter().map(SensorChannel::code),
                        &wake,
                        &mut state,
                        &mut board.log,
                        &board.clock,
                        &mut board.retained,
                    )
                    .await;
                faults.extend(sync_faults(&report));
                sync = Some(report);
            }
            (Ok(true), None) => {
                warn!("Sync due but no valid collector endpoint, readouts stay buffered");
                faults.push(CycleFault::SyncDisabled(ConfigError::InvalidUrl));
            }
            (Ok(false), _) => debug!("Cycle {} is not a sync cycle", state.boot_count),
            (Err(e), _) => {
                warn!("Sync disabled: {}", e);
                faults.push(CycleFault::SyncDisabled(e));
            }
        }
    }

    progress.enter(CycleRunState::PreparingSleep);
    if mounted && !state.flush_pending && logs_empty(&mut board.log, &board.channels) {
        state.sleep_enter_time = board.clock.now_ms();
        debug!("All logs empty, epoch advanced to {}", state.sleep_enter_time);
    }

    board.log.unmount();
    board.retained.store(&state);
    board.led.off();

    let plan = SleepPlan {
        timer: config.schedule.sleep_interval(),
        ext_wake_pin: config.schedule.ext_wake_pin,
    };
    power.arm(&plan);
    info!(
        "Cycle {} done with {} fault(s), sleeping for {:?}",
        state.boot_count,
        faults.len(),
        plan.timer
    );

    CycleReport {
        cause,
        state,
        sampling,
        sync,
        provisioned,
        faults,
        plan,
    }
}

/// Purge every configured channel's log.
///
/// All channels are attempted; the last failure is returned.
pub fn flush<S: Sensor, M: LogMedium>(
    log: &mut ReadoutLog<M>,
    channels: &[SensorChannel<S>],
) -> Result<(), StorageError> {
    channels
        .iter()
        .map(|channel| log.purge(channel.code()))
        .fold(Ok(()), |acc, result| result.and(acc))
}

fn logs_empty<S: Sensor, M: LogMedium>(
    log: &mut ReadoutLog<M>,
    channels: &[SensorChannel<S>],
) -> bool {
    channels
        .iter()
        .all(|channel| matches!(log.read_all(channel.code()), Ok(records) if records.is_empty()))
}

async fn provision<S, M, N, U, C, R, D, P, L>(
    config: &NodeConfig<'_>,
    board: &mut Board<S, M, N, U, C, R, D, P, L>,
) -> Result<(), NetError>
where
    N: Network,
    P: OutputPin,
    L: DelayNs,
{
    info!("Manual wake, waiting for WiFi provisioning");

    let result = match select(
        board.led.blink_forever(BUSY_BLINK_MS),
        board.network.provision(config.timeouts.provisioning()),
    )
    .await
    {
        Either::First(never) => match never {},
        Either::Second(result) => result,
    };
    board.network.disconnect().await;

    match result {
        Ok(()) => {
            info!("Provisioning complete");
            board.led.blink_success().await;
        }
        Err(e) => warn!("Provisioning failed: {}", e),
    }
    result
}

fn sync_faults(report: &SyncReport) -> Vec<CycleFault> {
    match report {
        SyncReport::Aborted(SyncAbort::TimeUnavailable(e)) => {
            vec![CycleFault::TimeAcquisitionTimeout(*e)]
        }
        SyncReport::Aborted(SyncAbort::Connect(e)) => vec![CycleFault::NetworkConnect(*e)],
        SyncReport::Aborted(SyncAbort::NotProvisioned) => {
            vec![CycleFault::NetworkConnect(NetError::NotProvisioned)]
        }
        SyncReport::Completed { channels, .. } => channels
            .iter()
            .filter_map(|channel| match (channel.outcome, channel.purge_error) {
                (ChannelOutcome::Failed(reason), _) => Some(CycleFault::Upload {
                    code: channel.code.clone(),
                    reason,
                }),
                (ChannelOutcome::Delivered, Some(e)) => Some(CycleFault::StorageIo(e)),
                (ChannelOutcome::Delivered, None) => None,
            })
            .collect(),
    }
}
