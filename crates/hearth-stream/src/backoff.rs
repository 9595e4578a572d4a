//! Exponential reconnect delay.

use std::time::Duration;

/// Doubling delay with a ceiling.  The first call to
/// [`next_delay`](Self::next_delay) after [`reset`](Self::reset) returns the
/// initial delay.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay for the upcoming attempt; the one after it doubles, capped.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the initial delay, after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// The delay [`next_delay`](Self::next_delay) would return, without
    /// advancing.
    pub fn peek(&self) -> Duration {
        self.current
    }
}
