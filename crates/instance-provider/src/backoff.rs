//! # Bounded Backoff
//!
//! Fixed-step backoff with jitter, shaped like the Kubernetes `wait.Backoff`:
//! `steps` attempts, starting at `duration`, multiplied by `factor` after each
//! attempt, each sleep stretched by up to `jitter * duration`.

use rand::Rng;
use std::time::Duration;
use tracing::warn;

/// Retry schedule with a fixed number of steps
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Number of attempts (at least one is always made)
    pub steps: u32,
    /// Initial delay between attempts
    pub duration: Duration,
    /// Multiplier applied to the delay after each attempt
    pub factor: f64,
    /// Maximum extra fraction of the delay added at random
    pub jitter: f64,
}

impl Backoff {
    /// Node convergence wait after agent pool creation: 15 x ~1s
    pub fn convergence() -> Self {
        Self {
            steps: 15,
            duration: Duration::from_secs(1),
            factor: 1.0,
            jitter: 0.1,
        }
    }

    /// Retry policy for node list reads: 5 x ~10ms
    pub fn node_list_retry() -> Self {
        Self {
            steps: 5,
            duration: Duration::from_millis(10),
            factor: 1.0,
            jitter: 0.1,
        }
    }

    /// Zero-delay policy for tests
    pub fn immediate(steps: u32) -> Self {
        Self {
            steps,
            duration: Duration::ZERO,
            factor: 1.0,
            jitter: 0.0,
        }
    }

    /// The sleep that follows attempt `attempt` (1-based), jitter included
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.duration.as_secs_f64() * self.factor.powi(exponent);
        let jitter = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0))
    }
}

/// Retry `operation` until it succeeds or the backoff is exhausted
///
/// Every error is treated as retryable; the last one is returned.
pub async fn retry_on_error<F, Fut, T, E>(backoff: &Backoff, operation_name: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let steps = backoff.steps.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= steps => return Err(e),
            Err(e) => {
                let delay = backoff.delay_for(attempt);
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_bounds() {
        let backoff = Backoff::convergence();
        for attempt in 1..=15 {
            let delay = backoff.delay_for(attempt);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_factor_grows_delay() {
        let backoff = Backoff {
            steps: 4,
            duration: Duration::from_millis(10),
            factor: 2.0,
            jitter: 0.0,
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(10));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_on_error(&Backoff::immediate(5), "list nodes", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err(format!("attempt {}", n)) } else { Ok(n) }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_on_error(&Backoff::immediate(5), "list nodes", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("attempt {}", n))
        })
        .await;
        assert_eq!(result.unwrap_err(), "attempt 5");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
