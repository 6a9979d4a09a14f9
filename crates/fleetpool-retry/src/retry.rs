//! The retry combinator.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// Wait strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPolicy {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// Delay doubles after each failed attempt, capped at `max`.
    ExponentialBackoff { initial: Duration, max: Duration },
}

impl DelayPolicy {
    /// Delay to apply after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(d) => *d,
            Self::ExponentialBackoff { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.checked_mul(factor).map_or(*max, |d| d.min(*max))
            }
        }
    }
}

/// Why a retried operation ultimately failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetryError<E, T = ()> {
    /// The attempt budget ran out; carries the last error observed.
    #[error("retry limit exceeded after {attempts} attempts: {last_error}")]
    LimitExceeded { attempts: u32, last_error: E },

    /// The classifier marked the error permanent; no further attempts made.
    #[error("permanent error, not retried: {0}")]
    Permanent(E),

    /// Every attempt produced a value, but none satisfied the success
    /// predicate; carries the last value.
    #[error("success predicate never satisfied after {attempts} attempts")]
    UnmetPredicate { attempts: u32, last: T },

    /// Cancelled while waiting between attempts.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E, T> RetryError<E, T> {
    /// The last error, if this outcome carries one.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::LimitExceeded { last_error, .. } | Self::Permanent(last_error) => {
                Some(last_error)
            }
            _ => None,
        }
    }
}

/// Bounded-retry wrapper around a fallible async operation.
#[derive(Debug, Clone)]
pub struct Retryer {
    /// Operation name, for log lines only.
    name: String,
    max_attempts: u32,
    delay_policy: DelayPolicy,
    cancel: Option<watch::Receiver<bool>>,
}

impl Retryer {
    /// A retryer making at most `max_attempts` attempts (minimum 1).
    pub fn new(name: impl Into<String>, max_attempts: u32, delay_policy: DelayPolicy) -> Self {
        Self {
            name: name.into(),
            max_attempts: max_attempts.max(1),
            delay_policy,
            cancel: None,
        }
    }

    /// Interrupt between-attempt sleeps when `true` is observed on the
    /// channel. In-flight attempts are never aborted.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run `op` until it succeeds, a permanent error occurs, or the attempt
    /// budget runs out. `is_retryable` classifies errors; anything it
    /// rejects is returned immediately as `Permanent`.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => return Err(RetryError::Permanent(e)),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryError::LimitExceeded {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_policy.delay_after(attempt);
                    debug!(
                        task = %self.name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    if !self.sleep(delay).await {
                        return Err(RetryError::Cancelled { attempts: attempt });
                    }
                }
            }
        }
    }

    /// Like [`run`](Self::run), but a produced value only counts as success
    /// when `is_successful` accepts it. Used for await-readiness loops
    /// ("retry listing until the machine reports an address").
    pub async fn run_until<T, E, F, Fut>(
        &self,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
        is_successful: impl Fn(&T) -> bool,
    ) -> Result<T, RetryError<E, T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = op().await;
            match outcome {
                Ok(value) if is_successful(&value) => return Ok(value),
                Ok(value) if attempt >= self.max_attempts => {
                    return Err(RetryError::UnmetPredicate {
                        attempts: attempt,
                        last: value,
                    });
                }
                Ok(_) => {
                    debug!(task = %self.name, attempt, "result rejected by predicate, retrying");
                }
                Err(e) if !is_retryable(&e) => return Err(RetryError::Permanent(e)),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryError::LimitExceeded {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    debug!(task = %self.name, attempt, error = %e, "attempt failed, retrying");
                }
            }
            if !self.sleep(self.delay_policy.delay_after(attempt)).await {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
        }
    }

    /// Sleep the given delay; returns false if cancelled first.
    async fn sleep(&self, delay: Duration) -> bool {
        match &self.cancel {
            None => {
                tokio::time::sleep(delay).await;
                true
            }
            Some(rx) => {
                if *rx.borrow() {
                    return false;
                }
                let mut rx = rx.clone();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => true,
                    changed = rx.changed() => match changed {
                        Ok(()) => !*rx.borrow(),
                        // Sender gone: nobody can cancel us anymore.
                        Err(_) => {
                            tokio::time::sleep(delay).await;
                            true
                        }
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> DelayPolicy {
        DelayPolicy::Fixed(Duration::from_millis(1))
    }

    #[test]
    fn fixed_delay_is_constant() {
        let policy = DelayPolicy::Fixed(Duration::from_secs(3));
        assert_eq!(policy.delay_after(1), Duration::from_secs(3));
        assert_eq!(policy.delay_after(10), Duration::from_secs(3));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = DelayPolicy::ExponentialBackoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4), Duration::from_secs(8));
        assert_eq!(policy.delay_after(5), Duration::from_secs(10));
        assert_eq!(policy.delay_after(60), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn succeeds_first_try_without_delay() {
        let retryer = Retryer::new("op", 3, fast());
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<u32, RetryError<String>> = retryer
            .run(
                || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(42)
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let retryer = Retryer::new("op", 5, fast());
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = retryer
            .run(
                || {
                    let c = c.clone();
                    async move {
                        if c.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err("timeout".to_string())
                        } else {
                            Ok(7u32)
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn limit_exceeded_carries_last_error() {
        let retryer = Retryer::new("op", 3, fast());
        let result: Result<(), _> = retryer
            .run(|| async { Err::<(), _>("still broken".to_string()) }, |_| true)
            .await;

        match result {
            Err(RetryError::LimitExceeded {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "still broken");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_errors_stop_immediately() {
        let retryer = Retryer::new("op", 5, fast());
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), _> = retryer
            .run(
                || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>("not found".to_string())
                    }
                },
                |e| !e.contains("not found"),
            )
            .await;

        assert!(matches!(result, Err(RetryError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_until_retries_rejected_values() {
        let retryer = Retryer::new("await-address", 5, fast());
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = retryer
            .run_until(
                || {
                    let c = c.clone();
                    async move { Ok::<_, String>(c.fetch_add(1, Ordering::SeqCst)) }
                },
                |_| true,
                |n| *n >= 2,
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_until_reports_last_rejected_value() {
        let retryer = Retryer::new("await-address", 2, fast());
        let result = retryer
            .run_until(|| async { Ok::<_, String>(0u32) }, |_| true, |n| *n > 0)
            .await;

        match result {
            Err(RetryError::UnmetPredicate { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let (tx, rx) = watch::channel(false);
        let retryer = Retryer::new("op", 100, DelayPolicy::Fixed(Duration::from_secs(3600)))
            .with_cancel(rx);

        let handle = tokio::spawn(async move {
            retryer
                .run(|| async { Err::<(), _>("flaky".to_string()) }, |_| true)
                .await
        });

        // Give the first attempt a moment to fail and enter backoff.
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
    }

    #[tokio::test]
    async fn already_cancelled_stops_after_first_failure() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let retryer = Retryer::new("op", 5, fast()).with_cancel(rx);

        let result: Result<(), _> = retryer
            .run(|| async { Err::<(), _>("flaky".to_string()) }, |_| true)
            .await;
        assert!(matches!(result, Err(RetryError::Cancelled { .. })));
    }

    #[test]
    fn zero_attempt_budget_is_clamped_to_one() {
        let retryer = Retryer::new("op", 0, fast());
        assert_eq!(retryer.max_attempts, 1);
    }
}
