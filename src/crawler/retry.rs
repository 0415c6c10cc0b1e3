use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ScrapeError;

/// How many times to try a target and how long to wait in between
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

/// Progress through a retry loop
#[derive(Debug, Default)]
pub struct RetryState {
    /// Attempts made so far
    pub attempt: u32,
    pub last_error: Option<ScrapeError>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the attempt with zero-based index `attempt_index`: `base * 2^index`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `attempt` until it succeeds or the attempts are used up.
    ///
    /// The closure gets the zero-based attempt index. On success, returns the value
    /// and the number of attempts made. Non-retryable errors stop the loop early.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> Result<(T, u32), ScrapeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ScrapeError>>,
    {
        let mut state = RetryState::default();

        while state.attempt < self.max_attempts {
            let index = state.attempt;
            state.attempt += 1;

            match attempt(index).await {
                Ok(value) => {
                    if index > 0 {
                        debug!("{} succeeded on attempt {}", label, state.attempt);
                    }
                    return Ok((value, state.attempt));
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    warn!(
                        "{} attempt {}/{} failed: {}",
                        label, state.attempt, self.max_attempts, e
                    );
                    state.last_error = Some(e);

                    if !retryable {
                        break;
                    }
                    if state.attempt < self.max_attempts {
                        tokio::time::sleep(self.delay_for(index)).await;
                    }
                }
            }
        }

        Err(state.into_exhausted())
    }
}

impl RetryState {
    fn into_exhausted(self) -> ScrapeError {
        match self.last_error {
            Some(err) => ScrapeError::ExhaustedRetries {
                attempts: self.attempt,
                kind: err.kind(),
                message: err.to_string(),
            },
            None => ScrapeError::ExhaustedRetries {
                attempts: self.attempt,
                kind: "ExhaustedRetries",
                message: "no attempt was made".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_delay_for() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500).saturating_mul(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let (value, attempts) = policy
            .run("target", |index| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if index < 2 {
                        Err(ScrapeError::transient("detached frame"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_and_reports_last_error() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let calls = AtomicU32::new(0);

        let err = policy
            .run("target", |index| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err::<(), _>(ScrapeError::NavigationTimeout {
                        url: format!("attempt-{}", index),
                        timeout: Duration::from_secs(1),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match err {
            ScrapeError::ExhaustedRetries { attempts, kind, message } => {
                assert_eq!(attempts, 2);
                assert_eq!(kind, "NavigationTimeout");
                assert!(message.contains("attempt-1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_stops_early() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let err = policy
            .run("target", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ScrapeError::InvalidTarget("x".to_string())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ScrapeError::ExhaustedRetries { attempts: 1, .. }));
    }
}
