//! Log reconciliation after an upload attempt
//!
//! A channel's log is purged only once the collector acknowledged the batch
//! built from it. Anything else keeps every record for the next sync, where
//! newer records are appended behind them.

use core::fmt::Display;

use log::{info, warn};

use crate::net::NetError;
use crate::sensors::ChannelCode;
use crate::storage::{LogMedium, ReadoutLog, StorageError};
use crate::sync::batch::BatchError;

/// Why a channel's batch was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The collector answered with something other than the delivered status
    Rejected(u16),
    Transport(NetError),
    Batch(BatchError),
    /// The log could not be read back
    Storage(StorageError),
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Rejected(status) => write!(f, "collector answered {}", status),
            Self::Transport(e) => write!(f, "{}", e),
            Self::Batch(e) => write!(f, "{}", e),
            Self::Storage(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    Delivered,
    Failed(FailureReason),
}

impl ChannelOutcome {
    /// Classify the result of a POST against the status the collector uses
    /// to acknowledge a stored batch.
    pub fn from_response(response: Result<u16, NetError>, delivered_status: u16) -> Self {
        match response {
            Ok(status) if status == delivered_status => Self::Delivered,
            Ok(status) => Self::Failed(FailureReason::Rejected(status)),
            Err(e) => Self::Failed(FailureReason::Transport(e)),
        }
    }
}

/// Apply an upload outcome to `code`'s log.
///
/// Returns an error only if a delivered log could not be purged; the records
/// then stay and are sent again on the next sync.
pub fn reconcile<M: LogMedium>(
    log: &mut ReadoutLog<M>,
    code: &ChannelCode,
    outcome: &ChannelOutcome,
) -> Result<(), StorageError> {
    match outcome {
        ChannelOutcome::Delivered => {
            log.purge(code)?;
            info!("{}: batch delivered, log purged", code);
        }
        ChannelOutcome::Failed(reason) => {
            warn!("{}: batch not delivered ({}), keeping log", code, reason);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryMedium;

    fn log_with(code: &ChannelCode, n: u64) -> ReadoutLog<MemoryMedium> {
        let mut log = ReadoutLog::new(MemoryMedium::new());
        log.mount().unwrap();
        for i in 0..n {
            log.append(code, i * 10_000, i as i32).unwrap();
        }
        log
    }

    #[test]
    fn only_the_delivered_status_counts() {
        assert_eq!(ChannelOutcome::from_response(Ok(201), 201), ChannelOutcome::Delivered);
        assert_eq!(
            ChannelOutcome::from_response(Ok(200), 201),
            ChannelOutcome::Failed(FailureReason::Rejected(200))
        );
        assert_eq!(
            ChannelOutcome::from_response(Err(NetError::Timeout), 201),
            ChannelOutcome::Failed(FailureReason::Transport(NetError::Timeout))
        );
    }

    #[test]
    fn delivered_purges_the_log() {
        let code = ChannelCode::new("TMP").unwrap();
        let mut log = log_with(&code, 3);

        reconcile(&mut log, &code, &ChannelOutcome::Delivered).unwrap();

        assert_eq!(log.count(&code), 0);
    }

    #[test]
    fn failure_keeps_every_record() {
        let code = ChannelCode::new("LUM").unwrap();
        let mut log = log_with(&code, 2);
        let before = log.read_all(&code).unwrap();

        let outcome = ChannelOutcome::Failed(FailureReason::Rejected(500));
        reconcile(&mut log, &code, &outcome).unwrap();

        assert_eq!(log.read_all(&code).unwrap(), before);
    }
}
