//! Backoff for the non-streaming provider fallback.

use std::future::Future;
use std::time::Duration;

use crate::error::EngineError;

/// How often, and how patiently, a failed provider call is repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Calls made in total, the first included.
    pub max_attempts: u32,
    /// Wait before the first repeat. Doubles for every further repeat.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Un-jittered wait before repeat `retry` (counted from 0).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Wait after `error` before repeat `retry`: the backoff spread over
    /// 75-125%, and never shorter than a server's `retry_after_ms`.
    pub fn delay_for(&self, retry: u32, error: &EngineError) -> Duration {
        let delay = self.backoff(retry).mul_f64(0.75 + jitter() * 0.5);
        match error {
            EngineError::RateLimited {
                retry_after_ms: Some(ms),
            } => delay.max(Duration::from_millis(*ms)),
            _ => delay,
        }
    }

    /// Run `call` until it succeeds, fails permanently, or the attempts run out.
    pub async fn execute<F, Fut, T>(&self, mut call: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        if self.max_attempts == 0 {
            return Err(EngineError::Configuration(
                "retry policy allows zero attempts".to_string(),
            ));
        }

        let mut retry = 0;
        loop {
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if !error.is_retryable() || retry + 1 >= self.max_attempts {
                return Err(error);
            }

            let delay = self.delay_for(retry, &error);
            tracing::warn!(
                attempt = retry + 1,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "provider call failed; retrying"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}

/// Random fraction in [0, 1).
fn jitter() -> f64 {
    (uuid::Uuid::new_v4().as_u128() % 10_000) as f64 / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_ceiling() {
        let policy = RetryPolicy::default();
        let waits: Vec<u64> = (0..7).map(|n| policy.backoff(n).as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn jittered_delay_stays_near_the_backoff() {
        let policy = RetryPolicy::default();
        let overloaded = EngineError::api(529, "overloaded");
        for _ in 0..50 {
            let delay = policy.delay_for(1, &overloaded);
            assert!(delay >= Duration::from_millis(1_500), "{delay:?}");
            assert!(delay <= Duration::from_millis(2_500), "{delay:?}");
        }
    }

    #[test]
    fn retry_after_hint_is_a_floor() {
        let policy = RetryPolicy::default();
        let limited = EngineError::RateLimited {
            retry_after_ms: Some(45_000),
        };
        assert_eq!(policy.delay_for(0, &limited), Duration::from_secs(45));

        let short_hint = EngineError::RateLimited {
            retry_after_ms: Some(10),
        };
        assert!(policy.delay_for(0, &short_hint) >= Duration::from_millis(750));
    }
}
