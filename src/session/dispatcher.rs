//! Candidate dispatch loop.
//!
//! Pulls classified candidates until the channel closes or cancellation is
//! observed. Each surviving candidate costs one worker-pool permit before
//! its task is spawned, which is the pipeline's backpressure: a slow asset
//! host saturates the pool, the dispatcher stops pulling, the bounded
//! candidate channel fills, and the strategy's pushes block.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::classify::Candidate;
use crate::limits::ConcurrencyGate;
use crate::memo::{CacheWriter, SeenSet};

use super::download::AssetClient;

/// Counters for one session run.
///
/// Atomics because concurrent download tasks update them; the session hands
/// back the final values once every task has joined.
#[derive(Debug, Default)]
pub struct SessionStats {
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    sequence: AtomicU64,
}

impl SessionStats {
    /// Successful downloads.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Candidates dropped by the seen-set (duplicate or prior-run id).
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Downloads that failed after their fallback attempt.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Rebuilds stats from final counter values.
    #[must_use]
    pub(super) fn from_counts(downloaded: usize, skipped: usize, failed: usize) -> Self {
        let stats = Self::default();
        stats.downloaded.store(downloaded, Ordering::SeqCst);
        stats.skipped.store(skipped, Ordering::SeqCst);
        stats.failed.store(failed, Ordering::SeqCst);
        stats
    }
}

/// Owns the dispatch loop state for one run.
pub(super) struct Dispatcher {
    pub assets: AssetClient,
    pub pool: ConcurrencyGate,
    pub throttle: ConcurrencyGate,
    pub cancel: CancelToken,
    pub seen: Arc<SeenSet>,
    pub writer: CacheWriter,
    pub output_root: PathBuf,
}

impl Dispatcher {
    /// Runs to completion: consumes the channel, drains in-flight work,
    /// closes both gates. Returns the run's counters.
    pub(super) async fn run(self, mut candidates: mpsc::Receiver<Candidate>) -> Arc<SessionStats> {
        let stats = Arc::new(SessionStats::default());
        let mut in_flight = JoinSet::new();

        loop {
            let candidate = tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("cancellation observed, no further candidates will be dispatched");
                    break;
                }
                received = candidates.recv() => match received {
                    Some(candidate) => candidate,
                    None => break, // Strategy and all its children finished.
                },
            };

            // Atomic check-and-set: the winner owns the download, everyone
            // else skips without consuming a pool slot.
            if !self.seen.check_and_insert(&candidate.id).await {
                debug!(id = %candidate.id, "already seen, skipping");
                stats.skipped.fetch_add(1, Ordering::SeqCst);
                continue;
            }

            let permit = tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("cancellation observed while waiting for a worker slot");
                    break;
                }
                acquired = self.pool.acquire() => match acquired {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let assets = self.assets.clone();
            let writer = self.writer.clone();
            let output_root = self.output_root.clone();
            let stats = Arc::clone(&stats);
            in_flight.spawn(async move {
                // Permit released when this task exits (RAII).
                let _permit = permit;
                let started = Instant::now();

                match assets.download(&candidate, &output_root).await {
                    Ok(path) => {
                        let seq = stats.next_sequence();
                        writer.record(candidate.id.clone()).await;
                        info!(
                            seq,
                            id = %candidate.id,
                            path = %path.display(),
                            elapsed_ms = started.elapsed().as_millis(),
                            "download completed"
                        );
                        stats.downloaded.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        warn!(id = %candidate.id, error = %e, "download failed");
                        stats.failed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }

        // Stop pulling, close both gates, then wait for the in-flight count
        // to reach zero. Issued permits stay valid, so dispatched work runs
        // to completion.
        drop(candidates);
        self.pool.close();
        self.throttle.close();

        debug!(in_flight = in_flight.len(), "draining in-flight downloads");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "download task panicked");
            }
        }
        stats
    }
}
