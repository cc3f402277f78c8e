//! One-shot cooperative cancellation.
//!
//! A [`CancelToken`] is cloned into every task of a session. Triggering it is
//! monotonic and idempotent: the flag only ever goes from clear to set.
//! Loops either poll [`is_cancelled`](CancelToken::is_cancelled) at their
//! emission points or `select!` on [`cancelled`](CancelToken::cancelled)
//! alongside their channel reads, so a blocked reader wakes without sentinel
//! values flowing through the data channel. In-flight network calls are never
//! aborted; only future work is suppressed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Cloneable one-shot stop signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Creates a fresh, untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every waiter. Safe to call more than once.
    pub fn trigger(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Non-blocking poll of the flag.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is triggered; returns immediately if it
    /// already was.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // A Notified future only registers at its first poll; enable() moves
        // registration here, so a trigger landing before the re-check cannot
        // slip past `notify_waiters`.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_is_visible_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.trigger();
        assert!(clone.is_cancelled());
        // Idempotent.
        token.trigger();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_blocked_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::task::yield_now().await;
        token.trigger();
        handle.await.expect("waiter completes after trigger");
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_set() {
        let token = CancelToken::new();
        token.trigger();
        // Must not hang.
        token.cancelled().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_trigger_always_wakes_waiter() {
        // Trigger races the waiter's registration across threads; every
        // iteration must wake within the timeout.
        for _ in 0..200 {
            let token = CancelToken::new();
            let waiter = token.clone();
            let waiting = tokio::spawn(async move {
                waiter.cancelled().await;
            });
            let firing = tokio::spawn(async move {
                token.trigger();
            });
            tokio::time::timeout(std::time::Duration::from_secs(2), waiting)
                .await
                .expect("waiter wakes despite racing trigger")
                .expect("waiter completes");
            firing.await.expect("trigger completes");
        }
    }
}
