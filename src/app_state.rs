//! Run states and the fault taxonomy of a wake cycle

use thiserror_no_std::Error;

use crate::config::ConfigError;
use crate::net::NetError;
use crate::sensors::ChannelCode;
use crate::storage::StorageError;
use crate::sync::reconcile::FailureReason;

/// Where the lifecycle controller currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleRunState {
    Waking,
    MountingStorage,
    Flushing,
    Sampling,
    Syncing,
    Provisioning,
    PreparingSleep,
}

/// Something that went wrong during a cycle.
///
/// None of these stop the node: the cycle always arms the next wake and goes
/// back to sleep. They are logged as they happen and collected in the cycle
/// report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleFault {
    #[error("{count} sensor read(s) failed")]
    SensorRead { count: usize },
    #[error("storage I/O failed: {0}")]
    StorageIo(StorageError),
    #[error("storage could not be mounted: {0}")]
    StorageMount(StorageError),
    #[error("wall clock could not be set: {0}")]
    TimeAcquisitionTimeout(NetError),
    #[error("network connection failed: {0}")]
    NetworkConnect(NetError),
    #[error("upload of {code} failed: {reason}")]
    Upload {
        code: ChannelCode,
        reason: FailureReason,
    },
    #[error("cold boot reset the clock, buffered readouts flushed")]
    ColdBootClockDiscontinuity,
    #[error("provisioning failed: {0}")]
    Provisioning(NetError),
    #[error("sync skipped, configuration invalid: {0}")]
    SyncDisabled(ConfigError),
}
