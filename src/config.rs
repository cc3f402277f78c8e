//! Run configuration: what to search for and what to keep.
//!
//! A [`SessionConfig`] is built once per run and handed to
//! [`HarvestSession`](crate::session::HarvestSession). The policy half
//! ([`HarvestPolicy`]) drives the classifier and strategies; the rest sizes
//! the pools and channels and points at the output root and id log.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default minimum popularity (bookmark count) for accepted candidates.
pub const DEFAULT_MIN_BOOKMARKS: u64 = 1000;

/// Default long-side floor for the full-size buckets.
pub const DEFAULT_SIZE_FLOOR: u32 = 1900;

/// Default short-side floor accompanying [`DEFAULT_SIZE_FLOOR`].
pub const DEFAULT_COMPANION_FLOOR: u32 = 1000;

/// Default recursion depth for the related-graph walk.
pub const DEFAULT_WALK_DEPTH: u32 = 2;

/// Default capacity of the download worker pool.
pub const DEFAULT_WORKER_POOL: usize = 8;

/// Default capacity of the discovery request throttle.
pub const DEFAULT_REQUEST_THROTTLE: usize = 5;

/// Orientation buckets a policy may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Landscape within the ratio band.
    Wide,
    /// Portrait within the ratio band.
    Tall,
    /// Below the size floors.
    Small,
    /// Within the floors but outside the ratio band.
    Other,
}

impl Orientation {
    /// Storage sub-path segment for this bucket.
    #[must_use]
    pub fn bucket_name(self) -> &'static str {
        match self {
            Self::Wide => "wide",
            Self::Tall => "tall",
            Self::Small => "small",
            Self::Other => "other",
        }
    }
}

/// What to harvest: one descriptor is supplied at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchDescriptor {
    /// Page a keyword search endpoint, newest first.
    Keyword(String),
    /// Walk the similarity graph outward from one or more seed ids.
    Related(Vec<String>),
    /// Enumerate everything published by one artist.
    Author(String),
}

/// Filtering policy applied to every discovered record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestPolicy {
    /// Minimum bookmark count; records below it are rejected.
    pub min_bookmarks: u64,
    /// Orientation buckets the run accepts.
    pub orientations: Vec<Orientation>,
    /// Whether adult-tagged records are kept (under an `adult/` prefix).
    pub allow_adult: bool,
    /// When set, ids persisted by earlier runs are eligible again.
    /// Within-run dedup is unaffected.
    pub allow_recrawl: bool,
    /// Long-side floor separating full-size buckets from `small`.
    pub size_floor: u32,
    /// Short-side floor accompanying `size_floor`.
    pub companion_floor: u32,
    /// Recursion depth for the related-graph walk.
    pub walk_depth: u32,
}

impl Default for HarvestPolicy {
    fn default() -> Self {
        Self {
            min_bookmarks: DEFAULT_MIN_BOOKMARKS,
            orientations: vec![Orientation::Wide, Orientation::Tall],
            allow_adult: false,
            allow_recrawl: false,
            size_floor: DEFAULT_SIZE_FLOOR,
            companion_floor: DEFAULT_COMPANION_FLOOR,
            walk_depth: DEFAULT_WALK_DEPTH,
        }
    }
}

impl HarvestPolicy {
    /// Returns whether the policy accepts the given orientation bucket.
    #[must_use]
    pub fn accepts(&self, orientation: Orientation) -> bool {
        self.orientations.contains(&orientation)
    }
}

/// Everything a session needs beyond its HTTP collaborators.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// What to discover.
    pub descriptor: SearchDescriptor,
    /// What to keep.
    pub policy: HarvestPolicy,
    /// Root directory for downloaded files; bucket paths nest under it.
    pub output_root: PathBuf,
    /// Append-only id log shared across runs.
    pub memo_path: PathBuf,
    /// Capacity of the download worker pool. The discovery request throttle
    /// is independent and lives with the catalog client.
    pub worker_pool: usize,
}

impl SessionConfig {
    /// Creates a config with default pool sizes and the given descriptor.
    ///
    /// The id log defaults to `<output_root>/memos`.
    #[must_use]
    pub fn new(descriptor: SearchDescriptor, policy: HarvestPolicy, output_root: PathBuf) -> Self {
        let memo_path = output_root.join("memos");
        Self {
            descriptor,
            policy,
            output_root,
            memo_path,
            worker_pool: DEFAULT_WORKER_POOL,
        }
    }
}
