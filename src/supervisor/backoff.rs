use std::time::Duration;

/// Exponential restart delay: `initial * 2^attempt`, capped at `max`.
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl RestartBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Delay before the next restart; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2_u32.saturating_pow(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Back to the initial delay once the child proved healthy.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
