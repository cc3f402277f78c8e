//! Fixed-capacity concurrency gates.
//!
//! Two independent [`ConcurrencyGate`]s bound the pipeline: the request
//! throttle (many cheap discovery calls) and the download worker pool (few
//! expensive transfers). Keeping them separate avoids head-of-line blocking
//! between discovery traffic and downloads.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Error returned when acquiring from a closed gate.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("concurrency gate closed during shutdown")]
pub struct GateClosed;

/// Semaphore wrapper handing out owned RAII permits.
///
/// Permits are released when dropped, so a spawned task holds its permit for
/// its whole lifetime simply by moving it into the task body.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    /// Creates a gate admitting at most `capacity` concurrent holders.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits for a free slot, blocking callers when the gate is saturated.
    ///
    /// # Errors
    ///
    /// Returns [`GateClosed`] once [`close`](Self::close) has been called,
    /// which happens during shutdown after the candidate channel drains.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, GateClosed> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)
    }

    /// Closes the gate; subsequent and pending acquires fail with
    /// [`GateClosed`]. Already-issued permits stay valid until dropped.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_gate_bounds_concurrent_holders() {
        let gate = ConcurrencyGate::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let gate = gate.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.expect("gate open");
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task completes");
        }
        assert!(peak.load(Ordering::SeqCst) <= 3, "gate must bound holders");
    }

    #[tokio::test]
    async fn test_closed_gate_rejects_acquire() {
        let gate = ConcurrencyGate::new(1);
        gate.close();
        assert_eq!(gate.acquire().await.unwrap_err(), GateClosed);
    }

    #[tokio::test]
    async fn test_close_does_not_revoke_issued_permits() {
        let gate = ConcurrencyGate::new(1);
        let permit = gate.acquire().await.expect("gate open");
        gate.close();
        drop(permit);
    }
}
