//! Retry policy for polling the remote indexing job

use std::time::Duration;

/// How long to keep polling a job that reports "not ready"
///
/// With neither `max_attempts` nor `deadline` set, polling continues until
/// the job is ready or the caller abandons the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between attempts
    pub interval: Duration,
    /// Total attempts allowed, including the first
    pub max_attempts: Option<u32>,
    /// Upper bound on time spent polling
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: None,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether another attempt may follow `attempts` failed ones after `elapsed`
    ///
    /// The next attempt would start after one more `interval`, so the deadline
    /// check includes it.
    pub fn allows_retry(&self, attempts: u32, elapsed: Duration) -> bool {
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            return false;
        }
        if self
            .deadline
            .is_some_and(|deadline| elapsed + self.interval > deadline)
        {
            return false;
        }
        true
    }
}

/// Blocking delay between polls; injected so tests can observe backoff
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current OS thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_unbounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(1));
        assert!(policy.allows_retry(10_000, Duration::from_secs(86_400)));
    }

    #[test]
    fn test_max_attempts_counts_first_attempt() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        assert!(policy.allows_retry(1, Duration::ZERO));
        assert!(policy.allows_retry(2, Duration::ZERO));
        assert!(!policy.allows_retry(3, Duration::ZERO));
    }

    #[test]
    fn test_deadline_includes_next_interval() {
        let policy = RetryPolicy::default()
            .with_interval(Duration::from_millis(500))
            .with_deadline(Duration::from_secs(2));
        assert!(policy.allows_retry(1, Duration::from_millis(1500)));
        assert!(!policy.allows_retry(1, Duration::from_millis(1600)));
    }

    #[test]
    fn test_thread_sleeper_sleeps() {
        let start = std::time::Instant::now();
        ThreadSleeper.sleep(Duration::from_millis(5));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
