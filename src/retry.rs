// Retry policies for outbound calls.
//
// Two shapes are used by the pipeline:
// - fixed-attempt retry with a constant delay, for customer batch fetches
//   (the call owns its own retries and reports only the final outcome);
// - leveled rounds, for catalog bunches: everything still failing after a
//   round is resubmitted together after `base * level`, up to a max level.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;
use tracing::warn;

/// A non-2xx response, kept typed so callers can tell 5xx from 4xx.
#[derive(Debug)]
pub struct HttpStatusError {
    pub service: &'static str,
    pub status: StatusCode,
    pub body: String,
}

impl fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} returned {}: {}", self.service, self.status, self.body)
    }
}

impl std::error::Error for HttpStatusError {}

/// Whether a failed call may succeed if repeated: connection and timeout
/// failures, 5xx responses and 429. Auth and request errors (401, 403, 400)
/// and undecodable bodies are returned at once.
pub fn is_transient(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<HttpStatusError>() {
            return is_transient_status(e.status);
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if let Some(status) = e.status() {
                return is_transient_status(status);
            }
            return e.is_timeout() || e.is_connect() || e.is_request() || e.is_body();
        }
    }
    false
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Settings for leveled retry rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Highest retry level. Round 0 is the first attempt, so a unit of work
    /// is tried at most `max_level + 1` times.
    pub max_level: u32,
    /// Delay unit; the wait before retry level `n` is `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_level: 5,
            base_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Delay before starting the round at `level` (zero for the first round).
    pub fn delay_for(&self, level: u32) -> Duration {
        self.base_delay.saturating_mul(level)
    }

    /// Whether another round may be started after a round at `level`.
    pub fn allows_retry_after(&self, level: u32) -> bool {
        level < self.max_level
    }
}

/// Run `operation` up to `attempts` times with a constant `delay` between
/// failures. An error `retryable` rejects is returned immediately; otherwise
/// the last error is returned when every attempt fails.
pub async fn with_fixed_retry<F, Fut, T, R>(
    attempts: u32,
    delay: Duration,
    label: &str,
    retryable: R,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&anyhow::Error) -> bool,
{
    let attempts = attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(err) if !retryable(&err) => {
                warn!(attempt = attempt, error = %err, "{label} failed, not retrying");
                return Err(err);
            }
            Err(err) => {
                warn!(
                    attempt = attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "{label} failed, retrying"
                );
                attempt += 1;
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
    fn test_delay_grows_linearly() {
        let policy = RetryPolicy {
            max_level: 5,
            base_delay: Duration::from_millis(5000),
        };
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(25000));
    }

    #[test]
    fn test_retry_allowed_until_max_level() {
        let policy = RetryPolicy {
            max_level: 2,
            base_delay: Duration::ZERO,
        };
        assert!(policy.allows_retry_after(0));
        assert!(policy.allows_retry_after(1));
        assert!(!policy.allows_retry_after(2));
    }

    #[tokio::test]
    async fn test_fixed_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result = with_fixed_retry(5, Duration::from_millis(1), "test", |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    anyhow::bail!("transient {n}")
                }
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fixed_retry_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_fixed_retry(4, Duration::from_millis(1), "test", |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { anyhow::bail!("always down") }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    fn status_error(code: u16) -> anyhow::Error {
        anyhow::Error::new(HttpStatusError {
            service: "Record store",
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        })
        .context("Customer batch failed")
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&status_error(500)));
        assert!(is_transient(&status_error(503)));
        assert!(is_transient(&status_error(429)));
        assert!(!is_transient(&status_error(400)));
        assert!(!is_transient(&status_error(401)));
        assert!(!is_transient(&status_error(403)));
        assert!(!is_transient(&anyhow::anyhow!("response has no rows")));
    }

    #[tokio::test]
    async fn test_fixed_retry_stops_on_auth_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_fixed_retry(5, Duration::from_millis(1), "test", is_transient, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(status_error(401)) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(format!("{err:#}").contains("401"));
    }

    #[tokio::test]
    async fn test_fixed_retry_retries_server_errors() {
        let calls = AtomicU32::new(0);
        let result = with_fixed_retry(5, Duration::from_millis(1), "test", is_transient, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    return Err(status_error(502));
                }
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
