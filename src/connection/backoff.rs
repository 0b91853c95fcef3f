use std::time::Duration;

/// Exponential reconnect schedule.
///
/// Attempt `a` (1-based) waits `base * 2^(a-1)`. After `max_attempts`
/// consecutive failures no further attempt is granted until `reset()`,
/// which a successful connect performs.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exp)
    }

    /// Claims the next attempt and returns its delay, or `None` once the
    /// cap has been reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.delay_for(self.attempt))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
