//! Per-request exponential backoff state.
use std::time::Duration;

/// Doubling delay with a ceiling.
///
/// Each `estimate` call owns its own instance, so concurrent requests on
/// one client back off independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// Delay to sleep before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Double the delay, capped at the ceiling.
    pub fn advance(&mut self) {
        self.current = self
            .current
            .checked_mul(2)
            .map_or(self.max, |d| d.min(self.max));
    }
}
