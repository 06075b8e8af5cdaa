use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff for remote writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub base_delay: Duration,
}

const MAX_DELAY: Duration = Duration::from_secs(30);

impl RetryPolicy {
    #[must_use]
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
    /// capped at 30s, plus up to 50% random jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1 << exp)
            .min(MAX_DELAY);
        let jitter_cap = u64::try_from(backoff.as_millis() / 2).unwrap_or(u64::MAX);
        if jitter_cap == 0 {
            return backoff;
        }
        backoff + Duration::from_millis(rand::rng().random_range(0..=jitter_cap))
    }

    /// Run `op` until it succeeds or the retries are used up, returning the
    /// last error.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        what,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_and_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let first = policy.delay_for(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        let third = policy.delay_for(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(600));
        let huge = policy.delay_for(40);
        assert!(huge >= MAX_DELAY && huge <= MAX_DELAY + MAX_DELAY / 2);
    }

    #[test]
    fn zero_base_has_no_delay() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let result: Result<u32, String> = policy
            .run("test", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(format!("fail {n}")) } else { Ok(n) }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(1, Duration::from_millis(10));
        let result: Result<(), String> = policy
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            })
            .await;
        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
