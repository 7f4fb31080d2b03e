use core::fmt::Display;

use embedded_hal_async::delay::DelayNs;
use log::warn;
use serde::{Deserialize, Serialize};

/// Bounded retry with a fixed delay between attempts.
///
/// Each attempt is itself bounded by the collaborator's own timeout, so a
/// policy never waits longer than `max_attempts * (timeout + delay)`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_attempts: u8,
    /// Pause between two attempts
    pub delay_ms: u32,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u8, delay_ms: u32) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    /// A single attempt, no retry.
    pub const fn once() -> Self {
        Self::new(1, 0)
    }

    pub const fn attempts(&self) -> u8 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. The error of the last attempt
    /// is returned on exhaustion.
    pub async fn run<T, E, D, F>(&self, what: &str, delay: &mut D, mut op: F) -> Result<T, E>
    where
        E: Display,
        D: DelayNs,
        F: AsyncFnMut(u8) -> Result<T, E>,
    {
        let attempts = self.attempts();
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    warn!("{}: giving up after {} attempt(s): {}", what, attempt, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("{}: attempt {}/{} failed: {}", what, attempt, attempts, e);
                    delay.delay_ms(self.delay_ms).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[derive(Default)]
    struct RecordingDelay {
        total_ms: u32,
        calls: u32,
    }

    impl DelayNs for RecordingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.total_ms += ns / 1_000_000;
            self.calls += 1;
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.total_ms += ms;
            self.calls += 1;
        }
    }

    #[test]
    fn stops_after_max_attempts() {
        let policy = RetryPolicy::new(10, 2_000);
        let mut delay = RecordingDelay::default();
        let mut calls = 0u8;

        let result: Result<(), &str> = block_on(policy.run("sntp", &mut delay, async |_| {
            calls += 1;
            Err("timeout")
        }));

        assert_eq!(result, Err("timeout"));
        assert_eq!(calls, 10);
        assert_eq!(delay.calls, 9);
        assert_eq!(delay.total_ms, 18_000);
    }

    #[test]
    fn returns_the_first_success() {
        let policy = RetryPolicy::new(5, 100);
        let mut delay = RecordingDelay::default();

        let result: Result<u8, &str> = block_on(policy.run("upload", &mut delay, async |attempt| {
            if attempt < 3 { Err("refused") } else { Ok(attempt) }
        }));

        assert_eq!(result, Ok(3));
        assert_eq!(delay.total_ms, 200);
    }

    #[test]
    fn once_never_waits() {
        let mut delay = RecordingDelay::default();

        let result: Result<(), &str> =
            block_on(RetryPolicy::once().run("connect", &mut delay, async |_| Err("down")));

        assert!(result.is_err());
        assert_eq!(delay.calls, 0);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut delay = RecordingDelay::default();
        let mut calls = 0;

        let _: Result<(), &str> = block_on(RetryPolicy::new(0, 10).run(
            "connect",
            &mut delay,
            async |_| {
                calls += 1;
                Err("down")
            },
        ));

        assert_eq!(calls, 1);
    }
}
