use std::time::Duration;

/// Doubling delay used between upstream polls that returned nothing new.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PollBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    current: Duration,
}

impl PollBackoff {
    pub(crate) fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        let max_delay = max_delay.max(initial_delay);
        Self {
            initial_delay,
            max_delay,
            current: initial_delay,
        }
    }

    /// Returns the delay to wait now and grows the next one.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = next_backoff(self.current, self.max_delay);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.initial_delay;
    }
}

pub(crate) fn next_backoff(current: Duration, max_backoff: Duration) -> Duration {
    if current.is_zero() {
        return max_backoff.min(Duration::from_millis(1));
    }

    let mut next = current.saturating_mul(2);
    if next > max_backoff {
        next = max_backoff;
    }
    next
}
