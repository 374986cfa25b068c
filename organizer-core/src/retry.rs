use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// A small, reusable backoff policy (SPEC_FULL §9). Both the analyser and
/// catalogue clients supply the same shape with different attempt
/// budgets and their own retryability predicate.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub factor: u32,
    pub max_attempts: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// initial 1s, factor 2, max 5 attempts, capped at 30s — the default
    /// named in spec §4.3/§4.4.
    pub fn default_external_call() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            factor: 2,
            max_attempts: 5,
            max_delay: Duration::from_secs(30),
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.factor.saturating_pow(attempt.saturating_sub(1));
        let scaled = self.initial_delay.saturating_mul(exp);
        std::cmp::min(scaled, self.max_delay)
    }
}

/// Adds up to 20% uniform jitter on top of the computed delay so that
/// concurrent retries don't thunder together.
fn jittered(delay: Duration) -> Duration {
    let fraction: f64 = rand::thread_rng().gen_range(0.0..0.2);
    delay + delay.mul_f64(fraction)
}

/// Runs `attempt` up to `policy.max_attempts` times, retrying only when
/// `is_retryable` accepts the error. Returns the last error once the
/// attempt budget is exhausted.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, is_retryable: F, mut attempt: impl FnMut() -> Fut) -> Result<T, E>
where
    F: Fn(&E) -> bool,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_err = None;
    for n in 1..=policy.max_attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if n == policy.max_attempts || !is_retryable(&err) {
                    return Err(err);
                }
                let delay = jittered(policy.delay_for_attempt(n));
                warn!("attempt {n} failed, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                last_err = Some(err);
            }
        }
    }
    // Unreachable in practice: max_attempts >= 1 guarantees an early return above.
    Err(last_err.expect("retry loop always records an error before looping again"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Transient;
    #[derive(Debug)]
    struct Permanent;

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_works() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            factor: 2,
            max_attempts: 5,
            max_delay: Duration::from_millis(10),
        };
        let result: Result<u32, Transient> = retry(&policy, |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_attempt_budget_then_gives_up() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            factor: 2,
            max_attempts: 3,
            max_delay: Duration::from_millis(10),
        };
        let result: Result<u32, Transient> = retry(&policy, |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Transient) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default_external_call();
        let result: Result<u32, Permanent> = retry(&policy, |_| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Permanent) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
