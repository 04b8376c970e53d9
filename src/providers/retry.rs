//! Retry configuration and the shared retry helper.
//!
//! Transient failures (transport errors and 5xx responses, as classified by
//! [`GatewayError::is_transient()`]) are retried with linear backoff; every
//! other failure is surfaced on the first attempt.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::telemetry;
use crate::{GatewayError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use greengate::RetryConfig;
/// let config = RetryConfig::new().attempts(2).backoff_secs(0.25);
/// assert_eq!(config.delay_for_attempt(2).as_millis(), 500);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first request. 0 = no retry. Default: 3.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Backoff unit in seconds; the delay before retry `n` is `backoff_secs * n`.
    /// Default: 0.5.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: f64,
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_secs() -> f64 {
    0.5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that never retries.
    pub fn disabled() -> Self {
        Self {
            attempts: 0,
            ..Self::default()
        }
    }

    /// Set the number of additional attempts.
    pub fn attempts(mut self, n: u32) -> Self {
        self.attempts = n;
        self
    }

    /// Set the backoff unit.
    pub fn backoff_secs(mut self, secs: f64) -> Self {
        self.backoff_secs = secs;
        self
    }

    /// Delay before retry `n` (1-indexed).
    pub fn delay_for_attempt(&self, n: u32) -> Duration {
        Duration::from_secs_f64((self.backoff_secs * f64::from(n)).max(0.0))
    }
}

/// Execute an async operation with retry logic.
///
/// Runs `f` once plus up to `config.attempts` retries while it fails with a
/// transient error. When retries are exhausted, a persistent 5xx is returned
/// as-is and a persistent transport failure becomes
/// [`GatewayError::UpstreamUnreachable`].
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    provider_name: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.attempts.saturating_add(1);
    let mut last_err = None;
    for attempt in 0..max_attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                if attempt + 1 < max_attempts {
                    metrics::counter!(telemetry::RETRIES_TOTAL,
                        "provider" => provider_name.to_owned(),
                    )
                    .increment(1);
                    let delay = config.delay_for_attempt(attempt + 1);
                    warn!(
                        provider = provider_name,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e), // permanent error, no retry
        }
    }
    Err(match last_err {
        Some(GatewayError::Transport(msg)) => GatewayError::UpstreamUnreachable(msg),
        Some(e) => e,
        None => GatewayError::UpstreamUnreachable(format!("{provider_name}: no attempt made")),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn backoff_is_linear() {
        let config = RetryConfig::new().backoff_secs(0.5);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_retried_then_surfaced() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&RetryConfig::new().attempts(2), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GatewayError::Upstream {
                    status: 502,
                    body: "bad gateway".into(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(GatewayError::Upstream { status: 502, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_transport_errors_become_unreachable() {
        let result: Result<()> = with_retry(&RetryConfig::new().attempts(1), "test", || async {
            Err(GatewayError::Transport("connection refused".into()))
        })
        .await;
        assert!(matches!(result, Err(GatewayError::UpstreamUnreachable(_))));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&RetryConfig::new(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GatewayError::Upstream {
                    status: 400,
                    body: "bad request".into(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(GatewayError::Upstream { status: 400, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryConfig::new(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(GatewayError::Transport("timeout".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }
}
