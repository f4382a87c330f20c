//! `RetryRule` and its four required concrete variants.
//!
//! Retry state lives only in memory for the lifetime of one step attempt
//! sequence; it is never persisted, so after a crash retry counters restart
//! from zero. See the design notes on in-memory-only retry counters.

use rand::Rng;
use std::time::Duration;

/// Consulted by the state machine after a `StepOutcome::FailureRetry`.
pub trait RetryRule: Send {
    /// Called once before the first attempt at a step (and again if the
    /// cursor re-enters the step from a different direction).
    fn reset(&mut self);

    /// Called after each `FailureRetry` outcome. `None` means give up
    /// (the step is treated as fatal); `Some(delay)` means sleep `delay`
    /// then repeat the step.
    fn next_delay(&mut self) -> Option<Duration>;
}

/// Never retries; the first `FailureRetry` is treated as fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryRule for NoRetry {
    fn reset(&mut self) {}
    fn next_delay(&mut self) -> Option<Duration> {
        None
    }
}

/// Up to `max_attempts` retries separated by a constant delay.
#[derive(Debug, Clone)]
pub struct FixedRetry {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
}

impl FixedRetry {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay, attempts: 0 }
    }
}

impl RetryRule for FixedRetry {
    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay)
    }
}

/// Up to `max_attempts` retries, delay drawn uniformly from `[min, max]`.
pub struct RandomBackoffRetry {
    max_attempts: u32,
    min: Duration,
    max: Duration,
    attempts: u32,
}

impl RandomBackoffRetry {
    pub fn new(max_attempts: u32, min: Duration, max: Duration) -> Self {
        Self { max_attempts, min, max, attempts: 0 }
    }
}

impl RetryRule for RandomBackoffRetry {
    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        if self.max <= self.min {
            return Some(self.min);
        }
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        let millis = rand::thread_rng().gen_range(lo..=hi);
        Some(Duration::from_millis(millis))
    }
}

/// Delay doubles each attempt starting from `initial`, capped at `max_delay`,
/// gives up once cumulative elapsed time exceeds `max_total`.
pub struct ExponentialBackoffRetry {
    initial: Duration,
    max_delay: Duration,
    max_total: Duration,
    next: Duration,
    elapsed: Duration,
}

impl ExponentialBackoffRetry {
    pub fn new(initial: Duration, max_delay: Duration, max_total: Duration) -> Self {
        Self { initial, max_delay, max_total, next: initial, elapsed: Duration::ZERO }
    }
}

impl RetryRule for ExponentialBackoffRetry {
    fn reset(&mut self) {
        self.next = self.initial;
        self.elapsed = Duration::ZERO;
    }

    fn next_delay(&mut self) -> Option<Duration> {
        if self.elapsed >= self.max_total {
            return None;
        }
        let delay = self.next.min(self.max_delay);
        self.elapsed += delay;
        self.next = (self.next * 2).min(self.max_delay);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_gives_up_immediately() {
        let mut r = NoRetry;
        r.reset();
        assert_eq!(r.next_delay(), None);
    }

    #[test]
    fn fixed_grants_exactly_n_attempts() {
        let mut r = FixedRetry::new(3, Duration::from_millis(10));
        r.reset();
        assert_eq!(r.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(r.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(r.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(r.next_delay(), None);
    }

    #[test]
    fn fixed_resets_counter() {
        let mut r = FixedRetry::new(1, Duration::from_millis(1));
        assert!(r.next_delay().is_some());
        assert!(r.next_delay().is_none());
        r.reset();
        assert!(r.next_delay().is_some());
    }

    #[test]
    fn random_backoff_stays_in_window() {
        let mut r = RandomBackoffRetry::new(20, Duration::from_millis(5), Duration::from_millis(15));
        r.reset();
        for _ in 0..20 {
            let d = r.next_delay().expect("attempt within budget");
            assert!(d >= Duration::from_millis(5) && d <= Duration::from_millis(15));
        }
        assert_eq!(r.next_delay(), None);
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let mut r = ExponentialBackoffRetry::new(
            Duration::from_millis(10),
            Duration::from_millis(50),
            Duration::from_secs(10),
        );
        r.reset();
        assert_eq!(r.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(r.next_delay(), Some(Duration::from_millis(20)));
        assert_eq!(r.next_delay(), Some(Duration::from_millis(40)));
        assert_eq!(r.next_delay(), Some(Duration::from_millis(50)));
        assert_eq!(r.next_delay(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn exponential_backoff_gives_up_past_max_total() {
        let mut r = ExponentialBackoffRetry::new(
            Duration::from_millis(100),
            Duration::from_millis(100),
            Duration::from_millis(250),
        );
        r.reset();
        assert!(r.next_delay().is_some());
        assert!(r.next_delay().is_some());
        assert_eq!(r.next_delay(), None);
    }
}
