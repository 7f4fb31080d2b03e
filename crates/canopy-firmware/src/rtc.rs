//! RTC retained memory and the wall clock
//!
//! The RTC timer keeps counting through deep sleep and the RTC fast memory
//! keeps its content, so both carry over from one wake to the next. A power-on
//! reset clears the timer and leaves the memory with arbitrary bytes, which
//! the retained image rejects.

use canopy::cycle::{CycleState, RETAINED_IMAGE_LEN, WakeupCause, decode_state, encode_state};
use canopy::cycle::RetainedStore;
use canopy::time::Clock;
use esp_hal::rtc_cntl::{Rtc, SocResetReason, reset_reason, wakeup_cause};
use esp_hal::system::{Cpu, SleepSource};
use log::warn;

#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut RETAINED_IMAGE: [u8; RETAINED_IMAGE_LEN] = [0; RETAINED_IMAGE_LEN];

/// Why this boot happened, in the core's terms.
pub fn wakeup() -> WakeupCause {
    let deep_sleep_reset = matches!(
        reset_reason(Cpu::ProCpu),
        Some(SocResetReason::CoreDeepSleep)
    );
    if !deep_sleep_reset {
        return WakeupCause::ColdBoot;
    }

    match wakeup_cause() {
        SleepSource::Timer => WakeupCause::TimerWake,
        SleepSource::Ext0 | SleepSource::Ext1 => WakeupCause::ExternalInterruptWake,
        _ => WakeupCause::ColdBoot,
    }
}

/// Access to the RTC fast memory image. Only one may exist.
pub struct RtcRetained {
    _private: (),
}

impl RtcRetained {
    /// # Safety
    ///
    /// Must be called at most once; the returned value is the only accessor
    /// of the retained image.
    pub unsafe fn take() -> Self {
        Self { _private: () }
    }
}

impl RetainedStore for RtcRetained {
    fn load(&mut self) -> Option<CycleState> {
        // SAFETY: `RtcRetained` is unique and the image is never touched from
        // interrupt context.
        let image = unsafe { &*core::ptr::addr_of!(RETAINED_IMAGE) };
        decode_state(image)
    }

    fn store(&mut self, state: &CycleState) {
        // SAFETY: see `load`.
        let image = unsafe { &mut *core::ptr::addr_of_mut!(RETAINED_IMAGE) };
        if let Err(e) = encode_state(state, image) {
            warn!("Failed to retain cycle state: {}", e);
        }
    }
}

/// Wall clock backed by the RTC timer, uptime by the embassy time driver.
#[derive(Clone, Copy)]
pub struct RtcClock {
    rtc: &'static Rtc<'static>,
}

impl RtcClock {
    pub fn new(rtc: &'static Rtc<'static>) -> Self {
        Self { rtc }
    }

    /// Step the wall clock, e.g. after SNTP.
    pub fn set_ms(&self, unix_ms: i64) {
        self.rtc.set_current_time_us(unix_ms.max(0) as u64 * 1_000);
    }
}

impl Clock for RtcClock {
    fn now_ms(&self) -> i64 {
        (self.rtc.current_time_us() / 1_000) as i64
    }

    fn uptime_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}
