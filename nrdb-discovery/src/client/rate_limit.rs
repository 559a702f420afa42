//! Token-bucket rate limiting for remote queries.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::context::QueryContext;
use crate::error::Result;
use crate::security::InputValidator;

/// Configuration for the query rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sustained query rate (default: 60 per minute).
    pub queries_per_minute: u32,
    /// Bucket capacity, i.e. how many queries may be issued back to back (default: 10).
    /// The burst never lifts the per-minute ceiling: a burst spends part of
    /// the same minute's allowance.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            queries_per_minute: 60,
            burst_size: 10,
        }
    }
}

impl RateLimitConfig {
    /// Creates a configuration with the given rate and burst.
    pub fn new(queries_per_minute: u32, burst_size: u32) -> Self {
        Self {
            queries_per_minute,
            burst_size,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        InputValidator::validate_positive(self.queries_per_minute as u64, "queries_per_minute")?;
        InputValidator::validate_positive(self.burst_size as u64, "burst_size")
    }
}

/// Length of the sliding window `queries_per_minute` applies to.
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    /// Grant times within the last [`WINDOW`], oldest first.
    granted: VecDeque<Instant>,
}

/// Token bucket shared by every caller of one client.
///
/// Refill is computed lazily from elapsed time on each acquisition; no
/// background task is involved. On top of the bucket, a log of recent grants
/// caps acquisitions at `queries_per_minute` in any 60 second window, so a
/// full bucket cannot add `burst_size` extra queries to a minute.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    per_window: usize,
    bucket: Mutex<Bucket>,
    waits: AtomicU64,
    acquired: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket.
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_window = config.queries_per_minute.max(1) as usize;
        let capacity = config.burst_size.max(1).min(config.queries_per_minute.max(1)) as f64;
        Self {
            capacity,
            refill_per_sec: per_window as f64 / WINDOW.as_secs_f64(),
            per_window,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
                granted: VecDeque::with_capacity(per_window),
            }),
            waits: AtomicU64::new(0),
            acquired: AtomicU64::new(0),
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
    }

    /// Takes a token if one is available, or returns how long until one will be.
    fn take_or_delay(&self) -> std::result::Result<(), Duration> {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        self.refill(&mut bucket, now);
        while bucket
            .granted
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) >= WINDOW)
        {
            bucket.granted.pop_front();
        }
        if bucket.granted.len() >= self.per_window {
            if let Some(oldest) = bucket.granted.front() {
                return Err(WINDOW.saturating_sub(now.saturating_duration_since(*oldest)));
            }
        }
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            bucket.granted.push_back(now);
            self.acquired.fetch_add(1, Ordering::Relaxed);
            Ok(())
        } else {
            let missing = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }

    /// Takes a token without waiting. Returns false if the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        self.take_or_delay().is_ok()
    }

    /// Waits until a token is available or `ctx` finishes.
    pub async fn wait(&self, ctx: &QueryContext) -> Result<()> {
        loop {
            ctx.check()?;
            match self.take_or_delay() {
                Ok(()) => return Ok(()),
                Err(delay) => {
                    self.waits.fetch_add(1, Ordering::Relaxed);
                    trace!(delay_ms = delay.as_millis() as u64, "Waiting for rate limit token");
                    ctx.sleep(delay).await?;
                }
            }
        }
    }

    /// Tokens currently available (after lazy refill).
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    /// Number of times a caller had to wait for a token.
    pub fn wait_count(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }

    /// Number of tokens handed out.
    pub fn acquired_count(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }
}
