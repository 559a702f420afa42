//! Three-state circuit breaker shared by all callers of one client.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{DiscoveryError, Result};
use crate::security::InputValidator;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the open duration elapses.
    Open,
    /// A limited number of probe calls are allowed through.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in closed state that open the circuit (default: 5).
    pub failure_threshold: u32,
    /// Successful probes in half-open state that close the circuit (default: 2).
    pub success_threshold: u32,
    /// How long the circuit stays open before probing (default: 30s).
    pub open_duration: Duration,
    /// Maximum concurrent probes while half-open (default: 3).
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(30),
            half_open_requests: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    pub fn with_half_open_requests(mut self, requests: u32) -> Self {
        self.half_open_requests = requests;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        InputValidator::validate_positive(self.failure_threshold as u64, "failure_threshold")?;
        InputValidator::validate_positive(self.success_threshold as u64, "success_threshold")?;
        InputValidator::validate_positive(self.half_open_requests as u64, "half_open_requests")?;
        if self.success_threshold > self.half_open_requests {
            return Err(DiscoveryError::configuration(
                "success_threshold cannot exceed half_open_requests",
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of the breaker, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub total_opens: u64,
    /// Time until a probe is allowed, when open.
    pub retry_in: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    opened_at: Option<Instant>,
    total_opens: u64,
}

impl Inner {
    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
        self.total_opens += 1;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
        self.opened_at = None;
    }
}

/// Circuit breaker guarding one remote endpoint.
///
/// The failure counter is consecutive: any success while closed resets it,
/// and there is no time-based decay. Every permitted call must be followed by
/// exactly one of [`record_success`](Self::record_success),
/// [`record_failure`](Self::record_failure) or
/// [`record_ignored`](Self::record_ignored) so that half-open probe slots are
/// released.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                half_open_in_flight: 0,
                opened_at: None,
                total_opens: 0,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Asks permission to issue a call.
    ///
    /// Returns [`DiscoveryError::CircuitOpen`] while open, or while half-open
    /// with all probe slots taken.
    pub fn allow(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= self.config.open_duration {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.half_open_in_flight = 1;
                    info!(state = %CircuitState::HalfOpen, "Circuit breaker probing remote store");
                    Ok(())
                } else {
                    Err(DiscoveryError::CircuitOpen {
                        retry_in: self.config.open_duration - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_requests {
                    inner.half_open_in_flight += 1;
                    Ok(())
                } else {
                    Err(DiscoveryError::CircuitOpen {
                        retry_in: Duration::ZERO,
                    })
                }
            }
        }
    }

    /// Reports a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.close();
                    info!(state = %CircuitState::Closed, "Circuit breaker closed");
                }
            }
            // A call admitted before the circuit opened; it cannot close it.
            CircuitState::Open => {}
        }
    }

    /// Reports a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.trip(now);
                    warn!(
                        failures = inner.consecutive_failures,
                        open_for_ms = self.config.open_duration.as_millis() as u64,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.trip(now);
                warn!("Circuit breaker probe failed, reopening");
            }
            CircuitState::Open => {}
        }
    }

    /// Releases a permit without counting the outcome, e.g. when the caller
    /// cancelled before the remote answered.
    pub fn record_ignored(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Current state. An open circuit whose duration has elapsed still reports
    /// `Open` until the next call probes it.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        let retry_in = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => Some(
                self.config
                    .open_duration
                    .saturating_sub(Instant::now().saturating_duration_since(opened_at)),
            ),
            _ => None,
        };
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
            total_opens: inner.total_opens,
            retry_in,
        }
    }

    /// Forces the breaker back to closed.
    pub fn reset(&self) {
        self.inner.lock().close();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
