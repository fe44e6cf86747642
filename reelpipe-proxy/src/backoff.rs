//! Linear backoff schedule for upstream retries.

use std::time::Duration;

use backon::BackoffBuilder;

/// Builds a linear schedule: retry `n` waits `delay * n`, up to `max_times`
/// retries. Pairs with `backon` the same way the exponential builders do.
#[derive(Debug, Clone, Copy)]
pub struct LinearBuilder {
    delay: Duration,
    max_times: usize,
}

impl LinearBuilder {
    #[must_use]
    pub const fn new(delay: Duration, max_times: usize) -> Self {
        Self { delay, max_times }
    }
}

impl BackoffBuilder for LinearBuilder {
    type Backoff = LinearBackoff;

    fn build(self) -> Self::Backoff {
        LinearBackoff {
            delay: self.delay,
            max_times: self.max_times,
            attempt: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinearBackoff {
    delay: Duration,
    max_times: usize,
    attempt: usize,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_times {
            return None;
        }
        self.attempt += 1;
        Some(self.delay.saturating_mul(self.attempt as u32))
    }
}
