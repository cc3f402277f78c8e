//! Harvester Core Library
//!
//! This library implements a concurrent image-harvesting pipeline: a
//! discovery strategy pulls candidate records from a remote catalog,
//! a pure classifier sorts them into storage buckets, and a bounded
//! worker pool downloads the surviving originals to disk.
//!
//! # Architecture
//!
//! - [`catalog`] - Remote catalog client (search, related, author, popularity)
//! - [`classify`] - Pure geometry/tag/popularity classifier
//! - [`strategy`] - Pluggable discovery strategies (keyword, related walk, author)
//! - [`session`] - Pipeline wiring: dispatcher, download workers, shutdown drain
//! - [`memo`] - Seen-id set and the append-only id log writer
//! - [`cancel`] - One-shot cooperative stop signal
//! - [`limits`] - Fixed-capacity concurrency gates

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod limits;
pub mod memo;
pub mod session;
pub mod strategy;
pub mod user_agent;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use catalog::{CandidateRecord, CatalogClient, CatalogEndpoints, CatalogError};
pub use classify::{Candidate, PopularityCheck, classify};
pub use config::{HarvestPolicy, Orientation, SearchDescriptor, SessionConfig};
pub use limits::ConcurrencyGate;
pub use memo::SeenSet;
pub use session::{AssetClient, HarvestSession, SessionError, SessionStats};
pub use strategy::{Strategy, StrategyError, build_strategy};
