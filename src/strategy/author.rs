//! Author enumeration strategy.
//!
//! Pages one artist's listing until a short page signals completion. The
//! artist's display name roots the bucket path. A catalog without author
//! endpoints makes this strategy fail with an explicit `Unsupported` error;
//! it must never degrade into a run that silently finds nothing.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::catalog::{CatalogError, PAGE_SIZE};
use crate::classify::PopularityCheck;

use super::{Strategy, StrategyContext, StrategyError};

/// Author paging has no reported total, so a dead endpoint would otherwise
/// be probed forever; this many consecutively abandoned pages end the run.
const MAX_ABANDONED_PAGES: u32 = 3;

/// Paged enumeration of one artist's works.
#[derive(Debug)]
pub struct AuthorStrategy {
    author_id: String,
}

impl AuthorStrategy {
    /// Creates a strategy enumerating `author_id`.
    #[must_use]
    pub fn new(author_id: String) -> Self {
        Self { author_id }
    }
}

#[async_trait]
impl Strategy for AuthorStrategy {
    fn name(&self) -> &'static str {
        "author"
    }

    async fn produce(&self, ctx: &StrategyContext) -> Result<(), StrategyError> {
        let root = match ctx.catalog.author_name(&self.author_id).await {
            Ok(name) => name,
            Err(CatalogError::Unsupported { operation }) => {
                return Err(StrategyError::Unsupported { operation });
            }
            Err(e) => {
                // Name is cosmetic; the id makes a serviceable bucket root.
                warn!(author_id = %self.author_id, error = %e, "author name lookup abandoned");
                self.author_id.clone()
            }
        };
        info!(author_id = %self.author_id, author = %root, "author enumeration started");

        let mut abandoned: u32 = 0;
        for page in 1.. {
            if ctx.cancel.is_cancelled() {
                break;
            }
            match ctx.catalog.author_page(&self.author_id, page).await {
                Ok(records) => {
                    abandoned = 0;
                    for record in &records {
                        if ctx.cancel.is_cancelled() {
                            break;
                        }
                        ctx.classify_and_emit(record, Some(&root), PopularityCheck::Enforce)
                            .await;
                    }
                    if records.len() < PAGE_SIZE {
                        info!(author = %root, page, "author enumeration exhausted");
                        break;
                    }
                }
                Err(CatalogError::Unsupported { operation }) => {
                    return Err(StrategyError::Unsupported { operation });
                }
                Err(e) => {
                    warn!(author = %root, page, error = %e, "author page abandoned");
                    abandoned += 1;
                    if abandoned >= MAX_ABANDONED_PAGES {
                        warn!(author = %root, "too many consecutive abandoned pages, stopping");
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
