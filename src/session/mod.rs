//! Session wiring: one object owns one run.
//!
//! A [`HarvestSession`] exclusively owns its seen-set, channels, gates and
//! cancel token, so independent runs (and tests) never share state. `run()`
//! connects the strategy to the dispatcher and shuts the pieces down in a
//! defined order: the candidate channel closes only after the strategy and
//! all its recursive children finish; the gates close after the dispatcher
//! stops pulling; the id-log queue closes after the last in-flight download
//! reports.

mod dispatcher;
mod download;

pub use dispatcher::SessionStats;
pub use download::{AssetClient, DownloadError};

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::catalog::CatalogClient;
use crate::classify::Candidate;
use crate::config::SessionConfig;
use crate::limits::ConcurrencyGate;
use crate::memo::{CacheWriter, MemoError, load_seen_set};
use crate::strategy::{StrategyContext, StrategyError, build_strategy};

use dispatcher::Dispatcher;

/// Capacity of the candidate channel between strategy and dispatcher.
const CANDIDATE_CHANNEL_CAP: usize = 64;

/// Errors that end a run. Everything here is a startup resource failure or
/// the loud unsupported-strategy signal; per-item failures never escalate.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Output root could not be created.
    #[error("cannot create output root {path}: {source}")]
    OutputRoot {
        /// The directory that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The persisted id log could not be opened or read.
    #[error(transparent)]
    Memo(#[from] MemoError),

    /// The chosen strategy cannot run against this catalog.
    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

/// One harvesting run, constructed once and consumed by [`run`](Self::run).
pub struct HarvestSession {
    config: SessionConfig,
    catalog: CatalogClient,
    assets: AssetClient,
    cancel: CancelToken,
}

impl HarvestSession {
    /// Creates a session over caller-configured catalog and asset clients.
    #[must_use]
    pub fn new(config: SessionConfig, catalog: CatalogClient, assets: AssetClient) -> Self {
        Self {
            config,
            catalog,
            assets,
            cancel: CancelToken::new(),
        }
    }

    /// Token to wire into an external stop signal (Ctrl-C, a test).
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs the pipeline to completion or cancellation drain.
    ///
    /// Always reaches the wait barrier: even under total item failure every
    /// spawned task is joined and the id log is flushed before returning.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] for startup resource failures (output root,
    /// id log) and for an unsupported strategy; per-item download failures
    /// are counted in [`SessionStats`] instead.
    pub async fn run(self) -> Result<SessionStats, SessionError> {
        tokio::fs::create_dir_all(&self.config.output_root)
            .await
            .map_err(|source| SessionError::OutputRoot {
                path: self.config.output_root.clone(),
                source,
            })?;

        let seen = load_seen_set(&self.config.memo_path, self.config.policy.allow_recrawl).await?;
        let (writer, writer_handle) = CacheWriter::spawn(&self.config.memo_path).await?;

        let (candidate_tx, candidate_rx) = mpsc::channel::<Candidate>(CANDIDATE_CHANNEL_CAP);
        let pool = ConcurrencyGate::new(self.config.worker_pool);

        let strategy = build_strategy(&self.config.descriptor);
        info!(
            strategy = strategy.name(),
            workers = self.config.worker_pool,
            throttle = self.catalog.throttle().capacity(),
            "session starting"
        );

        // The strategy task owns the only sender; the channel closes when it
        // returns, which happens only after all recursive children joined.
        let ctx = StrategyContext {
            catalog: self.catalog.clone(),
            policy: self.config.policy.clone(),
            candidates: candidate_tx,
            seen: Arc::clone(&seen),
            cancel: self.cancel.clone(),
        };
        let strategy_task = tokio::spawn(async move {
            let result = strategy.produce(&ctx).await;
            if let Err(e) = &result {
                error!(strategy = strategy.name(), error = %e, "strategy failed");
            }
            result
        });

        let dispatcher = Dispatcher {
            assets: self.assets,
            pool,
            throttle: self.catalog.throttle().clone(),
            cancel: self.cancel.clone(),
            seen,
            writer: writer.clone(),
            output_root: self.config.output_root.clone(),
        };
        let stats = dispatcher.run(candidate_rx).await;

        // The dispatcher only returns on channel close or cancel; either way
        // the strategy unwinds (closed throttle, cancelled emits) and must be
        // joined before the writer queue closes.
        let strategy_result = strategy_task.await;

        drop(writer);
        writer_handle.finish().await;

        info!(
            downloaded = stats.downloaded(),
            skipped = stats.skipped(),
            failed = stats.failed(),
            cancelled = self.cancel.is_cancelled(),
            "session finished"
        );

        match strategy_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => warn!(error = %e, "strategy task panicked"),
        }

        let stats = Arc::try_unwrap(stats).unwrap_or_else(|shared| {
            // All tasks joined, so this arm is unreachable in practice.
            SessionStats::from_counts(shared.downloaded(), shared.skipped(), shared.failed())
        });
        Ok(stats)
    }
}
