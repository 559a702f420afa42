//! Exponential backoff with jitter for transient remote failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::context::QueryContext;
use crate::error::Result;
use crate::security::InputValidator;

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts including the first one (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 500ms).
    pub initial_interval: Duration,
    /// Upper bound for any single delay (default: 10s).
    pub max_interval: Duration,
    /// Growth factor applied per attempt (default: 2.0).
    pub multiplier: f64,
    /// Random jitter as a fraction of the delay, applied as ± (default: 0.2).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        InputValidator::validate_positive(self.max_attempts as u64, "max_attempts")?;
        InputValidator::validate_ratio(self.jitter, "jitter")?;
        InputValidator::validate_threshold(self.multiplier, "multiplier")?;
        if self.multiplier < 1.0 {
            return Err(crate::error::DiscoveryError::configuration(
                "multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

/// Retry policy for remote calls.
///
/// Only errors classified as transient are retried. Permanent, circuit-open
/// and cancellation errors are returned after the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy from configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retrying after `failed_attempts` failures (1-based), without jitter.
    pub fn base_delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(32) as i32;
        let secs = self.config.initial_interval.as_secs_f64() * self.config.multiplier.powi(exponent);
        let capped = secs.min(self.config.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay with ± jitter, never above `max_interval`.
    pub fn backoff_with<R: Rng + ?Sized>(&self, failed_attempts: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(failed_attempts).as_secs_f64();
        let factor = if self.config.jitter > 0.0 {
            1.0 + rng.random_range(-self.config.jitter..=self.config.jitter)
        } else {
            1.0
        };
        let jittered = (base * factor).clamp(0.0, self.config.max_interval.as_secs_f64());
        Duration::from_secs_f64(jittered)
    }

    /// Delay with jitter from the thread-local generator.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        self.backoff_with(failed_attempts, &mut rand::rng())
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `operation` receives the 1-based attempt number. A server-provided
    /// retry-after hint replaces the computed backoff but is still clamped to
    /// `max_interval`.
    pub async fn execute<T, F, Fut>(&self, ctx: &QueryContext, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = match err.retry_after() {
                        Some(hint) => hint.min(self.config.max_interval),
                        None => self.backoff(attempt),
                    };
                    debug!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after transient failure"
                    );
                    ctx.sleep(delay).await?;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(attempts = attempt, error = %err, "Giving up after retries");
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
