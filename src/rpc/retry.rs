//! Retry policy for RPC calls.
//!
//! Fixed or linearly growing sleep between attempts, bounded or unbounded.
//! No jitter and no exponential growth.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the sleep between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backoff {
    /// Same delay after every failure
    Fixed,
    /// delay + step * (attempt - 1)
    Incremental { step: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// `None` retries until the call succeeds
    pub max_attempts: Option<u32>,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            delay: Duration::from_secs(1),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn bounded(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Sleep to apply after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Incremental { step } => self.delay + step * attempt.saturating_sub(1),
        }
    }

    /// Whether another attempt is allowed after `attempt` failures
    pub fn allows_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }

    /// Run `op` until it succeeds or the policy gives up.
    ///
    /// Returns the last error together with the number of attempts made.
    pub fn run<T, E, F>(&self, mut op: F) -> Result<T, (E, u32)>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !self.allows_retry(attempt) {
                        return Err((e, attempt));
                    }
                    let wait = self.delay_for(attempt);
                    match self.max_attempts {
                        Some(max) => log::warn!(
                            "Attempt {}/{} failed: {}, retrying in {:?}",
                            attempt,
                            max,
                            e,
                            wait
                        ),
                        None => log::warn!("Attempt {} failed: {}, retrying in {:?}", attempt, e, wait),
                    }
                    if !wait.is_zero() {
                        thread::sleep(wait);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::unbounded(Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(7), Duration::from_secs(1));
        assert!(policy.allows_retry(1_000_000));
    }

    #[test]
    fn test_incremental_delay() {
        let policy = RetryPolicy {
            max_attempts: Some(5),
            delay: Duration::from_millis(100),
            backoff: Backoff::Incremental {
                step: Duration::from_millis(50),
            },
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(150));
        assert_eq!(policy.delay_for(4), Duration::from_millis(250));
    }

    #[test]
    fn test_bounded_gives_up() {
        let policy = RetryPolicy::bounded(3, Duration::ZERO);
        let mut calls = 0;
        let result: Result<(), (String, u32)> = policy.run(|_| {
            calls += 1;
            Err("boom".to_string())
        });
        let (err, attempts) = result.unwrap_err();
        assert_eq!(err, "boom");
        assert_eq!(attempts, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_succeeds_after_failures() {
        let policy = RetryPolicy::bounded(5, Duration::ZERO);
        let result: Result<u32, (String, u32)> = policy.run(|attempt| {
            if attempt < 3 {
                Err(format!("fail {}", attempt))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }
}
