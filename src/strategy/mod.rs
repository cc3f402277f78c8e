//! Pluggable discovery strategies.
//!
//! A strategy turns one [`SearchDescriptor`](crate::config::SearchDescriptor)
//! into a stream of classified candidates pushed onto the session's channel.
//! Three variants exist: paged keyword search, the depth-limited
//! related-graph walk, and author enumeration. All of them go through the
//! shared [`StrategyContext::classify_and_emit`] path, which resolves the
//! popularity gate (including the one optional catalog fetch) and respects
//! cancellation at every emission point.

mod author;
mod keyword;
mod related;

pub use author::AuthorStrategy;
pub use keyword::KeywordStrategy;
pub use related::RelatedStrategy;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::catalog::{CandidateRecord, CatalogClient, CatalogError};
use crate::classify::{Candidate, PopularityCheck, classify};
use crate::config::{HarvestPolicy, SearchDescriptor};
use crate::memo::SeenSet;

/// Errors a strategy can surface to the session.
///
/// Transient catalog failures never appear here: strategies absorb them by
/// abandoning the affected page or fetch. What does escalate is the loud
/// "this catalog cannot do that" signal.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The chosen strategy is not available against this catalog.
    #[error("strategy unsupported by this catalog: {operation}")]
    Unsupported {
        /// The missing catalog operation.
        operation: &'static str,
    },

    /// A non-transient catalog failure before any unit of work could start.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Everything a strategy needs to produce candidates.
#[derive(Clone)]
pub struct StrategyContext {
    /// Catalog client (throttled, retrying).
    pub catalog: CatalogClient,
    /// Filtering policy for this run.
    pub policy: HarvestPolicy,
    /// Bounded channel into the dispatcher.
    pub candidates: mpsc::Sender<Candidate>,
    /// Ids already downloaded; consulted to skip pointless popularity calls.
    pub seen: Arc<SeenSet>,
    /// Cooperative stop signal.
    pub cancel: CancelToken,
}

impl StrategyContext {
    /// Classifies `record` and, on acceptance, pushes it to the dispatcher.
    ///
    /// Returns `false` when the record was rejected, the run was cancelled,
    /// or the dispatcher has gone away; strategies treat all three as
    /// "stop spending effort on this record" and only cancellation as
    /// "stop producing".
    pub(crate) async fn classify_and_emit(
        &self,
        record: &CandidateRecord,
        bucket_root: Option<&str>,
        check: PopularityCheck,
    ) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        // Already downloaded this run (or a prior one): the dispatcher would
        // drop it anyway, so do not spend a popularity fetch on it.
        if self.seen.contains(&record.id).await {
            return false;
        }

        // Geometry and tags decide first; a record rejected on those never
        // costs a popularity fetch.
        if classify(record, &self.policy, None, PopularityCheck::Skip).is_none() {
            return false;
        }

        let popularity = match self.resolve_popularity(record, check).await {
            Ok(popularity) => popularity,
            Err(e) => {
                warn!(id = %record.id, error = %e, "popularity fetch abandoned, skipping record");
                return false;
            }
        };

        let Some(mut candidate) = classify(record, &self.policy, popularity, check) else {
            return false; // Below the popularity floor.
        };
        if let Some(root) = bucket_root {
            candidate.bucket = prefix_bucket(root, &candidate.bucket);
        }

        debug!(id = %candidate.id, bucket = %candidate.bucket, "candidate accepted");
        tokio::select! {
            () = self.cancel.cancelled() => false,
            sent = self.candidates.send(candidate) => sent.is_ok(),
        }
    }

    /// Resolves the bookmark count, fetching it only when the record elided
    /// it and the gate actually applies.
    async fn resolve_popularity(
        &self,
        record: &CandidateRecord,
        check: PopularityCheck,
    ) -> Result<Option<u64>, CatalogError> {
        if let Some(count) = record.total_bookmarks {
            return Ok(Some(count));
        }
        if check == PopularityCheck::Skip {
            return Ok(None);
        }
        self.catalog.popularity(&record.id).await.map(Some)
    }
}

/// Joins a bucket root segment onto a classifier bucket, keeping any adult
/// prefix in front: `adult/keyword/tall`, not `keyword/adult/tall`.
fn prefix_bucket(root: &str, bucket: &str) -> String {
    match bucket.strip_prefix("adult/") {
        Some(rest) => format!("adult/{root}/{rest}"),
        None => format!("{root}/{bucket}"),
    }
}

/// A discovery strategy: produces candidates until exhausted or cancelled.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Human-readable strategy name for logs.
    fn name(&self) -> &'static str;

    /// Runs discovery to completion. Returning drops this strategy's hold
    /// on the candidate channel; the session closes it once every recursive
    /// child has finished too.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::Unsupported`] when the catalog cannot serve
    /// this strategy at all. Transient failures are absorbed per unit of
    /// work and never escalate.
    async fn produce(&self, ctx: &StrategyContext) -> Result<(), StrategyError>;
}

/// Maps a descriptor onto its strategy implementation.
#[must_use]
pub fn build_strategy(descriptor: &SearchDescriptor) -> Box<dyn Strategy> {
    match descriptor {
        SearchDescriptor::Keyword(keyword) => Box::new(KeywordStrategy::new(keyword.clone())),
        SearchDescriptor::Related(seeds) => Box::new(RelatedStrategy::new(seeds.clone())),
        SearchDescriptor::Author(author_id) => Box::new(AuthorStrategy::new(author_id.clone())),
    }
}
