//! Keyword search strategy.
//!
//! Pages the catalog's search endpoint newest-first until the total reported
//! on the first successful page is exhausted or a short page arrives. A page
//! that exhausts its retries inside the catalog client is abandoned and the
//! scan moves on; only a first page that never succeeds ends the run early,
//! since without a total the scan has no bound.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::catalog::PAGE_SIZE;
use crate::classify::PopularityCheck;

use super::{Strategy, StrategyContext, StrategyError};

/// Paged keyword search, newest first.
#[derive(Debug)]
pub struct KeywordStrategy {
    keyword: String,
}

impl KeywordStrategy {
    /// Creates a strategy for `keyword`. The keyword may arrive
    /// percent-encoded from the caller; the decoded form becomes the bucket
    /// root.
    #[must_use]
    pub fn new(keyword: String) -> Self {
        Self { keyword }
    }

    fn bucket_root(&self) -> String {
        urlencoding::decode(&self.keyword)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| self.keyword.clone())
    }
}

#[async_trait]
impl Strategy for KeywordStrategy {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn produce(&self, ctx: &StrategyContext) -> Result<(), StrategyError> {
        let root = self.bucket_root();
        let mut total: Option<usize> = None;

        for page in 1.. {
            if ctx.cancel.is_cancelled() {
                break;
            }
            match ctx.catalog.search_page(&self.keyword, page).await {
                Ok(body) => {
                    if total.is_none() {
                        total = Some(body.total);
                        info!(
                            keyword = %root,
                            total = body.total,
                            pages = body.total.div_ceil(PAGE_SIZE),
                            "keyword search started"
                        );
                    }
                    let count = body.illustrations.len();
                    for record in &body.illustrations {
                        if ctx.cancel.is_cancelled() {
                            break;
                        }
                        ctx.classify_and_emit(record, Some(&root), PopularityCheck::Enforce)
                            .await;
                    }
                    if count < PAGE_SIZE || page * PAGE_SIZE >= body.total {
                        info!(keyword = %root, page, "keyword search exhausted");
                        break;
                    }
                }
                Err(e) => {
                    warn!(keyword = %root, page, error = %e, "search page abandoned");
                    let Some(total) = total else {
                        // First page never succeeded: no total to bound the scan.
                        break;
                    };
                    if page * PAGE_SIZE >= total {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
