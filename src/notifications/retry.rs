use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::TransportError;

/// One failed attempt inside a retry loop
#[derive(Debug)]
pub struct AttemptFailure {
    /// Zero based
    pub attempt: u32,
    pub error: TransportError,
}

/// Every attempt failed; the failures are kept in attempt order
#[derive(Debug, Error)]
pub struct RetryError {
    pub failures: Vec<AttemptFailure>,
}

impl RetryError {
    pub fn last(&self) -> Option<&TransportError> {
        self.failures.last().map(|f| &f.error)
    }
}

impl fmt::Display for RetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} attempts failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; attempt {}: {}", failure.attempt + 1, failure.error)?;
        }
        Ok(())
    }
}

/// A success together with the attempts that failed before it
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,

    /// Zero based index of the attempt that succeeded
    pub attempt: u32,
    pub earlier_failures: Vec<AttemptFailure>,
}

/// Bounded retry with a fixed pause between attempts.
///
/// `retry_count` is the number of retries, so an operation runs at most
/// `retry_count + 1` times. Every attempt is bounded by `attempt_timeout`.
#[derive(Debug, Clone)]
pub struct RetryManager {
    retry_count: u32,
    retry_interval: Duration,
    attempt_timeout: Duration,
}

impl RetryManager {
    pub fn new(retry_count: u32, retry_interval: Duration, attempt_timeout: Duration) -> Self {
        Self {
            retry_count,
            retry_interval,
            attempt_timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Run `op` until it succeeds or the attempts are used up. The closure
    /// receives the zero based attempt index.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        self.execute_traced(op).await.map(|attempted| attempted.value)
    }

    /// Like [`execute`](Self::execute), but a success also reports the
    /// failures that preceded it.
    pub async fn execute_traced<T, F, Fut>(&self, mut op: F) -> Result<Attempted<T>, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let attempts = self.max_attempts();
        let mut failures = Vec::new();

        for attempt in 0..attempts {
            let result = match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(self.attempt_timeout)),
            };

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("succeeded on attempt {}/{attempts}", attempt + 1);
                    }
                    return Ok(Attempted {
                        value,
                        attempt,
                        earlier_failures: failures,
                    });
                }
                Err(error) => {
                    warn!("attempt {}/{attempts} failed: {error}", attempt + 1);
                    failures.push(AttemptFailure { attempt, error });
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.retry_interval).await;
            }
        }

        Err(RetryError { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager(retry_count: u32) -> RetryManager {
        RetryManager::new(
            retry_count,
            Duration::from_millis(5),
            Duration::from_millis(200),
        )
    }

    fn refused() -> TransportError {
        TransportError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = manager(2)
            .execute(|attempt| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 { Err(refused()) } else { Ok(attempt) }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_collect_every_failure() {
        let result: Result<(), _> = manager(2).execute(|_| async { Err(refused()) }).await;

        let err = result.unwrap_err();
        assert_eq!(err.failures.len(), 3);
        assert_eq!(
            err.failures.iter().map(|f| f.attempt).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(err.to_string().starts_with("all 3 attempts failed"));
    }

    #[tokio::test]
    async fn test_traced_success_keeps_earlier_failures() {
        let attempted = manager(3)
            .execute_traced(|attempt| async move {
                if attempt == 0 { Err(refused()) } else { Ok("sent") }
            })
            .await
            .unwrap();

        assert_eq!(attempted.value, "sent");
        assert_eq!(attempted.attempt, 1);
        assert_eq!(attempted.earlier_failures.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = manager(0)
            .execute(|_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(refused())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let manager = RetryManager::new(0, Duration::from_millis(1), Duration::from_millis(20));
        let result: Result<(), _> = manager
            .execute(|_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err.last(), Some(TransportError::Timeout(_))));
    }
}
