//! Deadline and cancellation propagation.
//!
//! A [`QueryContext`] travels from the orchestrator through the sampling
//! strategies and the resilient client down to the rate limiter. Every place
//! that can suspend (rate-limit waits, retry backoff, remote calls) races its
//! future against [`QueryContext::done`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{DiscoveryError, Result};

/// Caller-supplied deadline and cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Handle used to cancel every operation running under a [`QueryContext`].
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancels all operations observing the paired context.
    pub fn cancel(&self) {
        // Receivers may already be gone; that is not an error.
        let _ = self.sender.send(true);
    }
}

impl QueryContext {
    /// A context without deadline that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: None,
        }
    }

    /// A context that can be cancelled through the returned handle.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: Some(receiver),
            },
            CancelHandle { sender },
        )
    }

    /// Derives a child context whose deadline is the earlier of the parent's
    /// deadline and `now + timeout`. The cancel signal is shared.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns true if the context was cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.cancel_requested() || self.deadline_passed()
    }

    /// Returns an error if the context is already done.
    pub fn check(&self) -> Result<()> {
        if self.is_done() {
            Err(self.cancellation_error())
        } else {
            Ok(())
        }
    }

    /// The error describing why this context finished.
    pub fn cancellation_error(&self) -> DiscoveryError {
        if self.cancel_requested() {
            DiscoveryError::cancelled("cancelled by caller")
        } else {
            DiscoveryError::cancelled("deadline exceeded")
        }
    }

    /// Completes when the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        let cancelled = async {
            match self.cancel.clone() {
                Some(mut rx) => loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        // Sender dropped without cancelling.
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = deadline => {}
            _ = cancelled => {}
        }
    }

    /// Runs `fut` to completion unless the context finishes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.done() => Err(self.cancellation_error()),
            result = fut => result,
        }
    }

    /// Sleeps for `duration` unless the context finishes first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_sleep() {
        let ctx = QueryContext::with_timeout(Duration::from_secs(1));
        let result = ctx.sleep(Duration::from_secs(10)).await;
        assert!(matches!(result, Err(DiscoveryError::Cancelled { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_context_completes() {
        let ctx = QueryContext::background();
        assert!(ctx.sleep(Duration::from_secs(10)).await.is_ok());
        assert!(ctx.remaining().is_none());
    }

    #[tokio::test]
    async fn test_cancel_handle() {
        let (ctx, handle) = QueryContext::cancellable();
        assert!(ctx.check().is_ok());

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.sleep(Duration::from_secs(60)).await })
        };
        handle.cancel();

        let result = waiter.await.unwrap();
        match result {
            Err(DiscoveryError::Cancelled { reason }) => assert_eq!(reason, "cancelled by caller"),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert!(ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_earlier_deadline() {
        let parent = QueryContext::with_timeout(Duration::from_secs(5));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.child_with_timeout(Duration::from_secs(1));
        assert!(tighter.deadline() < parent.deadline());
    }
}
