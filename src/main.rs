//! CLI entry point for the harvester tool.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use harvester_core::config::{
    DEFAULT_MIN_BOOKMARKS, DEFAULT_REQUEST_THROTTLE, DEFAULT_WALK_DEPTH, DEFAULT_WORKER_POOL,
};
use harvester_core::{
    AssetClient, CatalogClient, CatalogEndpoints, ConcurrencyGate, HarvestPolicy, HarvestSession,
    Orientation, SearchDescriptor, SessionConfig,
};
use tracing::{info, warn};
use url::Url;

/// Connect timeout for both the catalog and the asset host.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyKind {
    /// Page a keyword search.
    Keyword,
    /// Walk the similarity graph from seed ids.
    Related,
    /// Enumerate one artist's works.
    Author,
}

#[derive(Debug, Parser)]
#[command(name = "harvester", version, about = "Harvest catalog originals into sorted buckets")]
struct Args {
    /// Keyword, comma-separated seed ids, or an author id (see --strategy)
    query: String,

    /// Discovery strategy
    #[arg(long, value_enum, default_value_t = StrategyKind::Keyword)]
    strategy: StrategyKind,

    /// Minimum bookmark count for accepted works
    #[arg(long, default_value_t = DEFAULT_MIN_BOOKMARKS)]
    min_bookmarks: u64,

    /// Accepted buckets as a letter set: w(ide), t(all), s(mall), o(ther)
    #[arg(long, default_value = "wt")]
    buckets: String,

    /// Keep adult-tagged works (stored under an adult/ prefix)
    #[arg(long)]
    allow_adult: bool,

    /// Re-examine ids recorded by earlier runs
    #[arg(long)]
    recrawl: bool,

    /// Related-walk recursion depth
    #[arg(long, default_value_t = DEFAULT_WALK_DEPTH)]
    depth: u32,

    /// Output root directory
    #[arg(long, default_value = "images")]
    output: PathBuf,

    /// Concurrent downloads
    #[arg(long, default_value_t = DEFAULT_WORKER_POOL)]
    workers: usize,

    /// Concurrent discovery calls
    #[arg(long, default_value_t = DEFAULT_REQUEST_THROTTLE)]
    throttle: usize,

    /// Catalog API base URL
    #[arg(long, default_value = "https://api.pixivic.com")]
    catalog: Url,

    /// Referer base sent with asset requests (candidate id is appended)
    #[arg(long, default_value = "https://www.pixiv.net/artworks/")]
    referer: String,

    /// File holding the opaque credential attached to catalog calls
    #[arg(long, default_value = "credential.txt")]
    credential_file: PathBuf,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn orientations(&self) -> Vec<Orientation> {
        let mut orientations = Vec::new();
        for letter in self.buckets.chars() {
            let orientation = match letter.to_ascii_lowercase() {
                'w' => Orientation::Wide,
                't' => Orientation::Tall,
                's' => Orientation::Small,
                'o' => Orientation::Other,
                other => {
                    warn!(letter = %other, "unknown bucket letter ignored");
                    continue;
                }
            };
            if !orientations.contains(&orientation) {
                orientations.push(orientation);
            }
        }
        orientations
    }

    fn descriptor(&self) -> SearchDescriptor {
        match self.strategy {
            StrategyKind::Keyword => SearchDescriptor::Keyword(self.query.clone()),
            StrategyKind::Related => SearchDescriptor::Related(
                self.query
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_owned)
                    .collect(),
            ),
            StrategyKind::Author => SearchDescriptor::Author(self.query.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // The credential is opaque: attached verbatim, never inspected.
    let credential = match std::fs::read_to_string(&args.credential_file) {
        Ok(contents) => contents.trim().to_owned(),
        Err(e) => {
            warn!(
                path = %args.credential_file.display(),
                error = %e,
                "credential file unavailable, calling without one"
            );
            String::new()
        }
    };

    let http = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let endpoints = CatalogEndpoints::new(args.catalog.clone())
        .context("invalid catalog base URL")?;
    let throttle = ConcurrencyGate::new(args.throttle);
    let catalog = CatalogClient::new(http.clone(), endpoints, credential, throttle);
    let assets = AssetClient::new(http, args.referer.clone());

    let policy = HarvestPolicy {
        min_bookmarks: args.min_bookmarks,
        orientations: args.orientations(),
        allow_adult: args.allow_adult,
        allow_recrawl: args.recrawl,
        walk_depth: args.depth,
        ..HarvestPolicy::default()
    };
    let mut config = SessionConfig::new(args.descriptor(), policy, args.output.clone());
    config.worker_pool = args.workers;

    let session = HarvestSession::new(config, catalog, assets);
    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop requested, draining in-flight downloads");
            cancel.trigger();
        }
    });

    let stats = session.run().await?;
    info!(
        downloaded = stats.downloaded(),
        skipped = stats.skipped(),
        failed = stats.failed(),
        "harvest complete"
    );
    Ok(())
}
