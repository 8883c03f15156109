//! crates/lesson_core/src/retry.rs
//!
//! Retry loop shared by every model-backed generator.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{GenerationError, LessonError};

/// How many times a model call is attempted and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Wait before the attempt following `attempt` (1-based). A provider-supplied
    /// `retry-after` wins over exponential backoff.
    pub fn delay_after(&self, attempt: u32, error: &GenerationError) -> Duration {
        if let GenerationError::Port(port) = error {
            if let Some(wait) = port.retry_after() {
                return wait;
            }
        }

        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let jitter_ms = match self.max_jitter.as_millis() as u64 {
            0 => 0,
            max => rand::thread_rng().gen_range(0..max),
        };
        self.base_delay.saturating_mul(factor) + Duration::from_millis(jitter_ms)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the attempt
    /// budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, LessonError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    warn!(attempt, max_attempts, error = %error, "{} attempt failed", label);
                    if !error.is_retryable() || attempt >= max_attempts {
                        return Err(LessonError::Generation {
                            attempts: attempt,
                            source: error,
                        });
                    }
                    let wait = self.delay_after(attempt, &error);
                    info!(wait_ms = wait.as_millis() as u64, "Retrying {}", label);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rate_limited(retry_after: Option<Duration>) -> GenerationError {
        GenerationError::Port(PortError::Provider {
            status: 429,
            message: "slow down".to_string(),
            retry_after,
        })
    }

    #[test]
    fn backoff_doubles_and_stays_within_jitter() {
        let policy = RetryPolicy::default();
        let error = GenerationError::Malformed("x".to_string());
        for attempt in 1..=4u32 {
            let base = 1000u64 * 2u64.pow(attempt - 1);
            let wait = policy.delay_after(attempt, &error).as_millis() as u64;
            assert!(wait >= base && wait < base + 1000, "attempt {attempt}: {wait}");
        }
    }

    #[test]
    fn provider_retry_after_wins() {
        let policy = RetryPolicy::default();
        let wait = policy.delay_after(3, &rate_limited(Some(Duration::from_secs(7))));
        assert_eq!(wait, Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn overloaded_retry_after_sets_the_wait() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result = RetryPolicy::default()
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        Err(GenerationError::Port(PortError::Provider {
                            status: 503,
                            message: "overloaded".to_string(),
                            retry_after: Some(Duration::from_secs(12)),
                        }))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GenerationError::Malformed("nope".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match result {
            Err(LessonError::Generation { attempts, .. }) => assert_eq!(attempts, 5),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(GenerationError::Port(PortError::Provider {
                        status: 400,
                        message: "bad request".to_string(),
                        retry_after: None,
                    }))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(LessonError::Generation { attempts: 1, .. })));
    }
}
