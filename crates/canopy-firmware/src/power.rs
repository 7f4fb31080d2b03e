//! Deep sleep with a timer and an RTC GPIO wake source.

use canopy::lifecycle::{PowerControl, SleepPlan};
use esp_hal::gpio::RtcPinWithResistors;
use esp_hal::peripherals::LPWR;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::rtc_cntl::sleep::{Ext1WakeupSource, TimerWakeupSource, WakeupLevel};
use log::info;

/// Used when nothing was armed.
const FALLBACK_SLEEP: core::time::Duration = core::time::Duration::from_secs(10);

pub struct DeepSleep<P> {
    wake_pin: P,
    plan: Option<SleepPlan>,
}

impl<P: RtcPinWithResistors> DeepSleep<P> {
    /// `wake_pin` is the RTC GPIO wired to the manual override button.
    pub fn new(wake_pin: P) -> Self {
        Self {
            wake_pin,
            plan: None,
        }
    }
}

impl<P: RtcPinWithResistors> PowerControl for DeepSleep<P> {
    fn arm(&mut self, plan: &SleepPlan) {
        self.plan = Some(*plan);
    }

    fn deep_sleep(&mut self) -> ! {
        let plan = self.plan.unwrap_or(SleepPlan {
            timer: FALLBACK_SLEEP,
            ext_wake_pin: None,
        });
        info!("Deep sleep for {:?}", plan.timer);

        // The wall clock holds a shared RTC handle for the whole wake. Nothing
        // runs past this point, so taking exclusive control here is sound.
        let mut rtc = Rtc::new(unsafe { LPWR::steal() });

        let timer = TimerWakeupSource::new(plan.timer);
        if plan.ext_wake_pin.is_some() {
            let mut pins: [(&mut dyn RtcPinWithResistors, WakeupLevel); 1] =
                [(&mut self.wake_pin, WakeupLevel::High)];
            let ext1 = Ext1WakeupSource::new(&mut pins);
            rtc.sleep_deep(&[&timer, &ext1])
        } else {
            rtc.sleep_deep(&[&timer])
        }
    }
}
