//! Persistent wake-cycle counter
//!
//! The counter lives in memory that survives deep sleep but not a power-on
//! reset. Its state is kept as a postcard image guarded by a magic word, so a
//! zeroed or garbage buffer after a cold boot reads as "no state".

use core::fmt::Display;
use core::num::NonZeroU32;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::time::{Clock, elapsed_ms};

/// Size of the retained buffer reserved for the cycle state.
pub const RETAINED_IMAGE_LEN: usize = 32;

const RETAINED_MAGIC: u32 = 0xC0FF_EE01;
const RETAINED_VERSION: u8 = 1;

/// Why the device is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupCause {
    /// Power-on, brown-out, first boot or any cause the platform cannot name
    ColdBoot,
    /// The sleep timer expired
    TimerWake,
    /// The manual override GPIO fired
    ExternalInterruptWake,
}

impl Display for WakeupCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::ColdBoot => "cold boot",
            Self::TimerWake => "timer",
            Self::ExternalInterruptWake => "external interrupt",
        })
    }
}

/// State carried from one wake cycle to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleState {
    /// Number of wakes since the last cold boot, starting at 1
    pub boot_count: u32,
    /// Wall-clock epoch (ms) that buffered readout offsets are measured from
    pub sleep_enter_time: i64,
    /// The logs still have to be flushed after a cold boot
    pub flush_pending: bool,
}

impl CycleState {
    /// State of the first cycle after a cold boot.
    pub const fn cold(now_ms: i64) -> Self {
        Self {
            boot_count: 1,
            sleep_enter_time: now_ms,
            flush_pending: true,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RetainedImage {
    magic: u32,
    version: u8,
    state: CycleState,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetainedError {
    #[error("retained buffer too small for cycle state")]
    BufferTooSmall,
}

/// Encode `state` into a retained buffer, returning the bytes used.
pub fn encode_state(state: &CycleState, buf: &mut [u8]) -> Result<usize, RetainedError> {
    let image = RetainedImage {
        magic: RETAINED_MAGIC,
        version: RETAINED_VERSION,
        state: *state,
    };

    postcard::to_slice(&image, buf)
        .map(|used| used.len())
        .map_err(|_| RetainedError::BufferTooSmall)
}

/// Decode a retained buffer; `None` if it does not hold a valid image.
pub fn decode_state(buf: &[u8]) -> Option<CycleState> {
    let image: RetainedImage = postcard::from_bytes(buf).ok()?;
    (image.magic == RETAINED_MAGIC && image.version == RETAINED_VERSION).then_some(image.state)
}

/// Memory that keeps the cycle state across deep sleep.
pub trait RetainedStore {
    fn load(&mut self) -> Option<CycleState>;
    fn store(&mut self, state: &CycleState);
}

/// A retained buffer held in ordinary memory.
///
/// Behaves like RTC memory: [`RetainedBuffer::power_loss`] wipes it.
#[derive(Debug, Clone)]
pub struct RetainedBuffer {
    bytes: [u8; RETAINED_IMAGE_LEN],
}

impl RetainedBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0; RETAINED_IMAGE_LEN],
        }
    }

    pub fn power_loss(&mut self) {
        self.bytes = [0; RETAINED_IMAGE_LEN];
    }

    pub fn as_bytes(&self) -> &[u8; RETAINED_IMAGE_LEN] {
        &self.bytes
    }

    pub fn from_bytes(bytes: [u8; RETAINED_IMAGE_LEN]) -> Self {
        Self { bytes }
    }
}

impl Default for RetainedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RetainedStore for RetainedBuffer {
    fn load(&mut self) -> Option<CycleState> {
        decode_state(&self.bytes)
    }

    fn store(&mut self, state: &CycleState) {
        if let Err(e) = encode_state(state, &mut self.bytes) {
            warn!("Failed to retain cycle state: {}", e);
        }
    }
}

/// Cadence predicate shared by sampling and sync decisions.
pub const fn is_due(boot_count: u32, cadence: NonZeroU32) -> bool {
    boot_count % cadence.get() == 0
}

/// What the counter knows at the start of a wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeState {
    pub cause: WakeupCause,
    pub state: CycleState,
    /// The retained state was discarded and the counter restarted at 1
    pub fresh_start: bool,
    /// Wall-clock ms between the epoch and this wake
    pub since_epoch_ms: u64,
    /// Wall-clock reading when the wake started
    pub woke_at_ms: i64,
    /// Uptime reading when the wake started
    pub woke_at_uptime_ms: u64,
}

/// Count this wake and persist the incremented counter immediately.
pub fn on_wake<R, C>(cause: WakeupCause, retained: &mut R, clock: &C) -> WakeState
where
    R: RetainedStore,
    C: Clock,
{
    let now = clock.now_ms();
    let previous = match cause {
        WakeupCause::ColdBoot => None,
        _ => retained.load(),
    };

    let (state, fresh_start) = match previous {
        Some(mut state) => {
            state.boot_count = state.boot_count.saturating_add(1);
            (state, false)
        }
        None => {
            if cause != WakeupCause::ColdBoot {
                warn!("No valid retained state after {} wake, restarting the counter", cause);
            }
            (CycleState::cold(now), true)
        }
    };

    retained.store(&state);

    let since_epoch_ms = elapsed_ms(state.sleep_enter_time, now);
    info!(
        "Wake #{} ({}), {} ms since epoch",
        state.boot_count, cause, since_epoch_ms
    );

    WakeState {
        cause,
        state,
        fresh_start,
        since_epoch_ms,
        woke_at_ms: now,
        woke_at_uptime_ms: clock.uptime_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct FixedClock(Cell<i64>);

    impl Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0.get()
        }

        fn uptime_ms(&self) -> u64 {
            0
        }
    }

    fn cadence(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn image_round_trips_within_the_retained_buffer() {
        let state = CycleState {
            boot_count: u32::MAX,
            sleep_enter_time: i64::MIN,
            flush_pending: true,
        };
        let mut buf = [0u8; RETAINED_IMAGE_LEN];

        let used = encode_state(&state, &mut buf).unwrap();

        assert!(used <= RETAINED_IMAGE_LEN);
        assert_eq!(decode_state(&buf), Some(state));
    }

    #[test]
    fn zeroed_or_foreign_buffers_hold_no_state() {
        assert_eq!(decode_state(&[0u8; RETAINED_IMAGE_LEN]), None);
        assert_eq!(decode_state(&[0xA5u8; RETAINED_IMAGE_LEN]), None);
        assert_eq!(decode_state(&[]), None);
    }

    #[test]
    fn small_buffers_are_reported() {
        let mut buf = [0u8; 4];
        assert_eq!(
            encode_state(&CycleState::cold(0), &mut buf),
            Err(RetainedError::BufferTooSmall)
        );
    }

    #[test]
    fn cold_boot_starts_counting_at_one() {
        let clock = FixedClock(Cell::new(7_000));
        let mut retained = RetainedBuffer::new();

        let wake = on_wake(WakeupCause::ColdBoot, &mut retained, &clock);

        assert!(wake.fresh_start);
        assert_eq!(wake.state, CycleState::cold(7_000));
        assert_eq!(retained.load(), Some(wake.state));
    }

    #[test]
    fn timer_wakes_increment_by_one() {
        let clock = FixedClock(Cell::new(0));
        let mut retained = RetainedBuffer::new();
        on_wake(WakeupCause::ColdBoot, &mut retained, &clock);

        for expected in 2..=5 {
            clock.0.set(clock.0.get() + 10_000);
            let wake = on_wake(WakeupCause::TimerWake, &mut retained, &clock);
            assert_eq!(wake.state.boot_count, expected);
            assert!(!wake.fresh_start);
        }
    }

    #[test]
    fn cold_boot_ignores_surviving_state() {
        let clock = FixedClock(Cell::new(0));
        let mut retained = RetainedBuffer::new();
        retained.store(&CycleState {
            boot_count: 41,
            sleep_enter_time: 0,
            flush_pending: false,
        });

        let wake = on_wake(WakeupCause::ColdBoot, &mut retained, &clock);

        assert_eq!(wake.state.boot_count, 1);
        assert!(wake.state.flush_pending);
    }

    #[test]
    fn timer_wake_with_lost_memory_restarts() {
        let clock = FixedClock(Cell::new(3_000));
        let mut retained = RetainedBuffer::new();
        retained.power_loss();

        let wake = on_wake(WakeupCause::TimerWake, &mut retained, &clock);

        assert!(wake.fresh_start);
        assert_eq!(wake.state.boot_count, 1);
    }

    #[test]
    fn since_epoch_is_measured_from_sleep_enter_time() {
        let clock = FixedClock(Cell::new(25_000));
        let mut retained = RetainedBuffer::new();
        retained.store(&CycleState {
            boot_count: 3,
            sleep_enter_time: 15_000,
            flush_pending: false,
        });

        let wake = on_wake(WakeupCause::TimerWake, &mut retained, &clock);

        assert_eq!(wake.since_epoch_ms, 10_000);
        assert_eq!(wake.woke_at_ms, 25_000);
    }

    #[test]
    fn cadence_two_fires_on_even_cycles() {
        let fired: [bool; 4] = core::array::from_fn(|i| is_due(i as u32 + 1, cadence(2)));
        assert_eq!(fired, [false, true, false, true]);
        assert!((1..=20).all(|n| is_due(n, cadence(1))));
    }
}
