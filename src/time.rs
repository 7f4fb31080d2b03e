//! Wall-clock helpers
//!
//! The node keeps two notions of time: the wall clock, which starts at the
//! Unix epoch after a cold boot and only becomes absolute once the network
//! provides the time, and a monotonic uptime counter for the current wake.

use alloc::string::{String, ToString};

use chrono::{DateTime, FixedOffset};

/// 2016-01-01T00:00:00Z. Any wall-clock reading earlier than this means the
/// clock has never been set since the last cold boot.
pub const CLOCK_SET_BASELINE_MS: i64 = 1_451_606_400_000;

/// Format used for upload timestamps (local time, no zone suffix).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub trait Clock {
    /// Wall-clock milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Monotonic milliseconds since this wake started.
    fn uptime_ms(&self) -> u64;
}

/// Whether a wall-clock reading is an absolute time rather than time since
/// an unset power-on epoch.
pub const fn is_absolute(wall_clock_ms: i64) -> bool {
    wall_clock_ms >= CLOCK_SET_BASELINE_MS
}

/// Milliseconds from `since` to `now`, clamped to zero when the clock stalls
/// or steps backwards.
pub fn elapsed_ms(since: i64, now: i64) -> u64 {
    now.saturating_sub(since).max(0) as u64
}

/// Render a wall-clock timestamp as local ISO-8601-like text.
///
/// Returns `None` when the timestamp or offset is outside chrono's range.
pub fn format_local(timestamp_ms: i64, utc_offset_secs: i32) -> Option<String> {
    let offset = FixedOffset::east_opt(utc_offset_secs)?;
    let utc = DateTime::from_timestamp_millis(timestamp_ms)?;

    Some(
        utc.with_timezone(&offset)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
    )
}
