//! Related-graph walk strategy.
//!
//! From one or more seed ids, fetches each node's related listing and
//! recurses related-of-related down to a fixed depth. Every node spawns its
//! children as independent tasks and waits on them before returning, so the
//! strategy only finishes once the whole tree has unwound. A walk-local
//! visited set keeps the fan-out finite; the request throttle and the depth
//! cap bound it further. At depth zero a node still emits the candidates it
//! found but spawns no children.
//!
//! Popularity is enforced only for nodes discovered at the root depth;
//! deeper candidates skip the gate, saving one catalog call each on records
//! whose listings elide the count.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::catalog::PAGE_SIZE;
use crate::classify::PopularityCheck;
use crate::memo::SeenSet;

use super::{Strategy, StrategyContext, StrategyError};

/// Related pages fetched per node before moving on.
const RELATED_PAGES: usize = 3;

/// Depth-limited similarity-graph walk.
#[derive(Debug)]
pub struct RelatedStrategy {
    seeds: Vec<String>,
}

impl RelatedStrategy {
    /// Creates a walk starting from `seeds`.
    #[must_use]
    pub fn new(seeds: Vec<String>) -> Self {
        Self { seeds }
    }
}

#[async_trait]
impl Strategy for RelatedStrategy {
    fn name(&self) -> &'static str {
        "related"
    }

    async fn produce(&self, ctx: &StrategyContext) -> Result<(), StrategyError> {
        let walk = Arc::new(Walk {
            ctx: ctx.clone(),
            visited: SeenSet::new(),
            max_depth: ctx.policy.walk_depth,
        });

        let mut roots = JoinSet::new();
        for seed in &self.seeds {
            if walk.visited.check_and_insert(seed).await {
                let walk = Arc::clone(&walk);
                let seed = seed.clone();
                roots.spawn(walk.clone().visit(seed, walk.max_depth));
            }
        }
        while let Some(joined) = roots.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "graph walk task panicked");
            }
        }
        Ok(())
    }
}

/// Shared state threaded through every node of the walk.
struct Walk {
    ctx: StrategyContext,
    /// Nodes whose related listings have been (or are being) fetched.
    visited: SeenSet,
    max_depth: u32,
}

impl Walk {
    /// Visits one node: emits its related records and, while `depth > 0`,
    /// spawns a sub-walk per unvisited child. Boxed because the future
    /// recurses through the spawns.
    fn visit(self: Arc<Self>, id: String, depth: u32) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if self.ctx.cancel.is_cancelled() {
                return;
            }
            debug!(id = %id, depth, "walking related listings");
            let check = if depth == self.max_depth {
                PopularityCheck::Enforce
            } else {
                PopularityCheck::Skip
            };

            let mut children = JoinSet::new();
            for page in 1..=RELATED_PAGES {
                if self.ctx.cancel.is_cancelled() {
                    break;
                }
                let records = match self.ctx.catalog.related_page(&id, page).await {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(id = %id, page, error = %e, "related fetch abandoned");
                        break;
                    }
                };
                let short = records.len() < PAGE_SIZE;

                for record in &records {
                    if self.ctx.cancel.is_cancelled() {
                        break;
                    }
                    self.ctx.classify_and_emit(record, None, check).await;
                    if depth > 0 && self.visited.check_and_insert(&record.id).await {
                        let walk = Arc::clone(&self);
                        children.spawn(walk.visit(record.id.clone(), depth - 1));
                    }
                }
                if short {
                    break;
                }
            }

            // Wait only on children this node itself spawned; after a cancel
            // they return at their first check and the tree unwinds fast.
            while let Some(joined) = children.join_next().await {
                if let Err(e) = joined {
                    warn!(id = %id, error = %e, "child walk task panicked");
                }
            }
        })
    }
}
