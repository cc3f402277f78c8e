//! Wire types for catalog responses.
//!
//! Everything here is transient: decoded from one response body, classified,
//! then dropped. Field names follow the catalog's camelCase JSON.

use serde::Deserialize;

/// Fixed page size used by every paginated endpoint.
pub const PAGE_SIZE: usize = 30;

/// One URL set attached to a record.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ImageUrls {
    /// Full-resolution asset URL.
    pub original: String,
}

/// Raw catalog metadata for one work.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    /// Catalog id.
    pub id: String,
    /// Work kind, e.g. `illust`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Asset URL variants; the first entry's `original` is the download source.
    #[serde(default)]
    pub image_urls: Vec<ImageUrls>,
    /// Pixel width.
    #[serde(default)]
    pub width: u32,
    /// Pixel height.
    #[serde(default)]
    pub height: u32,
    /// Bookmark count; absent on endpoints that elide it.
    #[serde(default)]
    pub total_bookmarks: Option<u64>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp as reported by the catalog.
    #[serde(default)]
    pub create_date: Option<String>,
}

impl CandidateRecord {
    /// URL of the original asset, when the record carries one.
    #[must_use]
    pub fn original_url(&self) -> Option<&str> {
        self.image_urls.first().map(|urls| urls.original.as_str())
    }

    /// Minimal record for unit tests.
    #[doc(hidden)]
    #[must_use]
    pub fn for_test(id: &str, original: &str, width: u32, height: u32) -> Self {
        Self {
            id: id.to_owned(),
            kind: "illust".to_owned(),
            image_urls: vec![ImageUrls {
                original: original.to_owned(),
            }],
            width,
            height,
            total_bookmarks: None,
            tags: Vec::new(),
            create_date: None,
        }
    }
}

/// One page of keyword search results.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    /// Records on this page, newest first.
    #[serde(default)]
    pub illustrations: Vec<CandidateRecord>,
    /// Total matching records across all pages.
    #[serde(default)]
    pub total: usize,
}

/// One page of related-work or author-listing results.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    /// Records on this page.
    #[serde(default)]
    pub illustrations: Vec<CandidateRecord>,
}

/// Single-work detail response, used for the gated popularity fetch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailResponse {
    /// The work's full record, including its bookmark count.
    pub illustration: CandidateRecord,
}

/// Artist profile response, used to root author buckets.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorProfile {
    /// Display name used as the storage bucket root.
    pub name: String,
}
