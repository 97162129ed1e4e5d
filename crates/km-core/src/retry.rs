//! Retry utilities with exponential backoff, shared by the entitlement
//! client and the plugin host's restart scheduler.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt).
    pub max_attempts: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps the exponential growth).
    pub max_delay: Duration,
    /// Base for exponential backoff (typically 2.0).
    pub exponential_base: f64,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        exponential_base: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            exponential_base,
        }
    }

    /// Retry schedule for the entitlement client's HTTP calls: 3 attempts.
    #[must_use]
    pub fn http() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(5), 2.0)
    }

    /// Restart schedule for a plugin that exited unexpectedly: unbounded
    /// attempts, 5s initial delay, capped at 5 minutes, per §4.5.
    #[must_use]
    pub fn plugin_restart() -> Self {
        Self::new(u32::MAX, Duration::from_secs(5), Duration::from_secs(300), 2.0)
    }

    /// Calculates the delay for a given attempt number (0-indexed).
    ///
    /// Returns `Duration::ZERO` for attempt 0, then exponentially increasing
    /// delays for subsequent attempts, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay_ms =
            self.initial_delay.as_millis() as f64 * self.exponential_base.powi(exponent);
        let capped_delay_ms = base_delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_delay_ms.max(0.0) as u64)
    }

    /// Returns true if more attempts are allowed given the current attempt count.
    #[must_use]
    pub fn should_retry(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::http()
    }
}

/// Result of a retry operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed after all retry attempts.
    Exhausted {
        /// The final error.
        error: E,
        /// Total number of attempts made.
        attempts: u32,
    },
    /// Operation was aborted before completion (cancellation token fired).
    Aborted,
}

impl<T, E> RetryOutcome<T, E> {
    /// Returns true if the operation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Converts to a Result, discarding attempt count on failure.
    pub fn into_result(self, abort_error: E) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Exhausted { error, .. } => Err(error),
            Self::Aborted => Err(abort_error),
        }
    }
}

/// Execute an async operation with retry and exponential backoff.
///
/// `should_retry` decides, per error, whether another attempt is worthwhile;
/// return `false` to abort early on non-retryable errors (e.g. 401).
pub async fn retry<T, E, Fut, F, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => return RetryOutcome::Success(value),
            Err(error) => {
                if !config.should_retry(attempt) || !should_retry(&error) {
                    return RetryOutcome::Exhausted {
                        error,
                        attempts: attempt + 1,
                    };
                }

                attempt += 1;
                let delay = config.delay_for_attempt(attempt);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_calculation() {
        let config = RetryConfig::new(5, Duration::from_millis(100), Duration::from_secs(10), 2.0);
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn delay_caps_at_max() {
        let config = RetryConfig::plugin_restart();
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(20));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(40));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(80));
        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(160));
        assert_eq!(config.delay_for_attempt(7), Duration::from_secs(300));
        assert_eq!(config.delay_for_attempt(20), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn retry_succeeds_after_failures() {
        let config = RetryConfig::new(5, Duration::from_millis(1), Duration::from_millis(10), 2.0);
        let outcome = super::retry(
            &config,
            |attempt| async move {
                if attempt < 2 {
                    Err("transient")
                } else {
                    Ok("recovered")
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(outcome, RetryOutcome::Success("recovered"));
    }

    #[tokio::test]
    async fn retry_aborts_on_non_retryable() {
        let config = RetryConfig::new(5, Duration::from_millis(1), Duration::from_millis(10), 2.0);
        let outcome = super::retry(
            &config,
            |_attempt| async { Err::<(), _>("permanent") },
            |_err| false,
        )
        .await;
        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted { error: "permanent", attempts: 1 }
        ));
    }
}
