use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Deterministic exponential backoff with bolt-on jitter.
///
/// The exponential core is pure (`delay`), so retry math is testable without
/// real waits; jitter is applied separately at the call site boundary.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    factor: f64,
    cap: Duration,
    jitter: f64,
}

impl BackoffPolicy {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            base: Duration::from_secs(config.base_secs),
            factor: config.factor,
            cap: Duration::from_secs(config.cap_secs),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }

    /// Raw delay for the given zero-based attempt: `base x factor^attempt`,
    /// capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.factor.powi(attempt.min(63) as i32);
        let delay = self.base.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.cap.as_secs_f64()))
    }

    /// [`Self::delay`] with symmetric jitter applied.
    pub fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter == 0.0 {
            return delay;
        }
        let spread = rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter);
        Duration::from_secs_f64(delay.as_secs_f64() * spread)
    }

    /// Wait before the next attempt: the larger of the venue's suggested
    /// minimum and the jittered exponential delay.
    pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.jittered(attempt);
        match retry_after {
            Some(suggested) => backoff.max(suggested),
            None => backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(&BackoffConfig::default())
    }

    #[test]
    fn test_delay_doubles_from_base() {
        let policy = policy();
        assert_eq!(policy.delay(0), Duration::from_secs(10));
        assert_eq!(policy.delay(1), Duration::from_secs(20));
        assert_eq!(policy.delay(2), Duration::from_secs(40));
        assert_eq!(policy.delay(5), Duration::from_secs(320));
    }

    #[test]
    fn test_delay_caps_at_ten_minutes() {
        let policy = policy();
        assert_eq!(policy.delay(6), Duration::from_secs(600));
        assert_eq!(policy.delay(20), Duration::from_secs(600));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(600));
    }

    #[test]
    fn test_jitter_stays_within_twenty_percent() {
        let policy = policy();
        for attempt in 0..6 {
            let raw = policy.delay(attempt).as_secs_f64();
            for _ in 0..100 {
                let jittered = policy.jittered(attempt).as_secs_f64();
                assert!(jittered >= raw * 0.8 - f64::EPSILON);
                assert!(jittered <= raw * 1.2 + f64::EPSILON);
            }
        }
    }

    #[test]
    fn test_venue_retry_after_acts_as_floor() {
        let policy = policy();
        // Suggested wait above the backoff wins
        let delay = policy.next_delay(0, Some(Duration::from_secs(60)));
        assert!(delay >= Duration::from_secs(60));
        // Suggested wait below the backoff loses
        let delay = policy.next_delay(3, Some(Duration::from_secs(1)));
        assert!(delay >= Duration::from_secs(64)); // 80s - 20% jitter
    }
}
