//! Remote catalog client.
//!
//! One [`CatalogClient`] serves every discovery call of a session: paginated
//! keyword search, related-work lookup, artist listings, and the gated
//! popularity fetch. Every call acquires the request throttle first, carries
//! the opaque credential header plus a rotating browser User-Agent, and
//! retries transient failures a fixed number of times with a fixed delay.
//! The HTTP transport itself (proxying, connection pooling) is configured by
//! the caller and handed in ready-made.

mod error;
mod record;

pub use error::CatalogError;
pub use record::{
    AuthorProfile, CandidateRecord, DetailResponse, ImageUrls, ListingPage, PAGE_SIZE, SearchPage,
};

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::limits::ConcurrencyGate;
use crate::user_agent::random_user_agent;

/// Default per-call timeout.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Fixed-bound, fixed-delay retry configuration for catalog calls.
///
/// Deliberately not exponential: the catalog's transient failures are brief
/// flakes, and a page abandoned after the bound is a tolerable loss.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per unit of work, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Endpoint roots for one catalog deployment.
///
/// Author endpoints are optional: a catalog without them makes the author
/// strategy report `Unsupported` instead of silently finding nothing.
#[derive(Debug, Clone)]
pub struct CatalogEndpoints {
    base: Url,
    author_listing: bool,
}

impl CatalogEndpoints {
    /// Endpoints rooted at `base`, with author listing available.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Malformed`] if `base` cannot carry path
    /// segments (e.g. a `mailto:` URL).
    pub fn new(base: Url) -> Result<Self, CatalogError> {
        if base.cannot_be_a_base() {
            return Err(CatalogError::Malformed {
                url: base.to_string(),
                detail: "catalog base URL cannot carry path segments".to_owned(),
            });
        }
        Ok(Self {
            base,
            author_listing: true,
        })
    }

    /// Endpoints for a catalog that offers no author listing.
    ///
    /// # Errors
    ///
    /// Same as [`CatalogEndpoints::new`].
    pub fn without_author_listing(base: Url) -> Result<Self, CatalogError> {
        let mut endpoints = Self::new(base)?;
        endpoints.author_listing = false;
        Ok(endpoints)
    }

    fn at(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            // pop_if_empty keeps a trailing-slash base from doubling up.
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Client for the remote catalog service.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    endpoints: CatalogEndpoints,
    credential: String,
    throttle: ConcurrencyGate,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl CatalogClient {
    /// Creates a client over a caller-configured transport.
    ///
    /// `credential` is attached verbatim as the `Authorization` header on
    /// every call; the client never inspects or refreshes it.
    #[must_use]
    pub fn new(
        http: Client,
        endpoints: CatalogEndpoints,
        credential: String,
        throttle: ConcurrencyGate,
    ) -> Self {
        Self {
            http,
            endpoints,
            credential,
            throttle,
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Replaces the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The request throttle shared by all discovery calls.
    #[must_use]
    pub fn throttle(&self) -> &ConcurrencyGate {
        &self.throttle
    }

    /// Fetches one page of keyword search results, newest first.
    ///
    /// Pages are 1-indexed with a fixed size of [`PAGE_SIZE`]. An empty page
    /// inside the known total is treated as malformed and retried like a
    /// transport failure.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] once the retry bound is exhausted; the
    /// caller abandons that page only.
    #[instrument(level = "debug", skip(self))]
    pub async fn search_page(&self, keyword: &str, page: usize) -> Result<SearchPage, CatalogError> {
        let mut url = self.endpoints.at(&["illustrations"]);
        url.query_pairs_mut()
            .append_pair("keyword", keyword)
            .append_pair("type", "illust")
            .append_pair("order", "date_d")
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &PAGE_SIZE.to_string());

        self.fetch_with_retry(&url, |body: SearchPage| {
            let expected_more = body.total > 0 && (page - 1) * PAGE_SIZE < body.total;
            if body.illustrations.is_empty() && expected_more {
                return Err(CatalogError::Malformed {
                    url: url.to_string(),
                    detail: format!("empty page {page} inside known total {}", body.total),
                });
            }
            Ok(body)
        })
        .await
    }

    /// Fetches one page of works related to `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] once the retry bound is exhausted; the
    /// caller abandons that related fetch only.
    #[instrument(level = "debug", skip(self))]
    pub async fn related_page(
        &self,
        id: &str,
        page: usize,
    ) -> Result<Vec<CandidateRecord>, CatalogError> {
        let mut url = self.endpoints.at(&["illusts", id, "related"]);
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &PAGE_SIZE.to_string());

        let body: ListingPage = self.fetch_with_retry(&url, Ok).await?;
        Ok(body.illustrations)
    }

    /// Fetches the bookmark count for one work.
    ///
    /// Used only when a listing elided the count and the policy still needs
    /// it; deep graph-walk candidates skip this call entirely.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Malformed`] when the detail record itself
    /// lacks a count, or the usual transient errors past the retry bound.
    #[instrument(level = "debug", skip(self))]
    pub async fn popularity(&self, id: &str) -> Result<u64, CatalogError> {
        let url = self.endpoints.at(&["illusts", id]);
        let body: DetailResponse = self.fetch_with_retry(&url, Ok).await?;
        body.illustration
            .total_bookmarks
            .ok_or_else(|| CatalogError::Malformed {
                url: url.to_string(),
                detail: "detail record carries no bookmark count".to_owned(),
            })
    }

    /// Resolves an artist's display name (the author bucket root).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unsupported`] when the catalog offers no
    /// author endpoints.
    #[instrument(level = "debug", skip(self))]
    pub async fn author_name(&self, author_id: &str) -> Result<String, CatalogError> {
        if !self.endpoints.author_listing {
            return Err(CatalogError::Unsupported {
                operation: "author listing",
            });
        }
        let url = self.endpoints.at(&["artists", author_id]);
        let profile: AuthorProfile = self.fetch_with_retry(&url, Ok).await?;
        Ok(profile.name)
    }

    /// Fetches one page of an artist's works.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unsupported`] when the catalog offers no
    /// author endpoints, otherwise the usual transient errors.
    #[instrument(level = "debug", skip(self))]
    pub async fn author_page(
        &self,
        author_id: &str,
        page: usize,
    ) -> Result<Vec<CandidateRecord>, CatalogError> {
        if !self.endpoints.author_listing {
            return Err(CatalogError::Unsupported {
                operation: "author listing",
            });
        }
        let mut url = self.endpoints.at(&["artists", author_id, "illusts"]);
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &PAGE_SIZE.to_string());

        let body: ListingPage = self.fetch_with_retry(&url, Ok).await?;
        Ok(body.illustrations)
    }

    /// Bounded retry loop shared by every endpoint.
    ///
    /// `validate` turns a decoded body the endpoint considers unusable into
    /// a transient error so it joins the same retry path as transport
    /// failures.
    async fn fetch_with_retry<T, V>(&self, url: &Url, validate: V) -> Result<T, CatalogError>
    where
        T: DeserializeOwned,
        V: Fn(T) -> Result<T, CatalogError>,
    {
        let mut attempt: u32 = 1;
        loop {
            let result = self.fetch_once(url).await.and_then(&validate);
            match result {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        url = %url,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "catalog call failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One throttled attempt. The permit is held only for the duration of
    /// the call, never across the retry delay.
    async fn fetch_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T, CatalogError> {
        let _permit = self.throttle.acquire().await?;

        debug!(url = %url, "catalog request");
        let response = self
            .http
            .get(url.clone())
            .timeout(self.call_timeout)
            .header(AUTHORIZATION, &self.credential)
            .header(USER_AGENT, random_user_agent())
            .send()
            .await
            .map_err(|source| CatalogError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| CatalogError::Malformed {
                url: url.to_string(),
                detail: source.to_string(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn endpoints(base: &str) -> CatalogEndpoints {
        CatalogEndpoints::new(Url::parse(base).expect("valid url")).expect("base url")
    }

    #[test]
    fn test_endpoint_joining_handles_trailing_slash() {
        let plain = endpoints("https://api.example.com");
        let slashed = endpoints("https://api.example.com/");
        assert_eq!(
            plain.at(&["illusts", "42", "related"]).as_str(),
            "https://api.example.com/illusts/42/related"
        );
        assert_eq!(
            slashed.at(&["illusts", "42", "related"]).as_str(),
            "https://api.example.com/illusts/42/related"
        );
    }

    #[test]
    fn test_cannot_be_a_base_is_rejected() {
        let url = Url::parse("mailto:someone@example.com").expect("valid url");
        assert!(CatalogEndpoints::new(url).is_err());
    }
}
