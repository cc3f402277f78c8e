//! Asset download client.
//!
//! Resolves a candidate's source URL to the canonical full-resolution
//! variant, fetches it with the referer header the asset host demands and a
//! rotating browser User-Agent, and streams the body straight to its bucket
//! directory. A body that lands implausibly small is deleted and retried
//! exactly once against the alternate file-extension variant; a truncated
//! file is never left on disk.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{REFERER, USER_AGENT};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use url::Url;

use crate::classify::Candidate;
use crate::user_agent::random_user_agent;

/// Bodies below this size are error pages, not images.
const MIN_VALID_BYTES: u64 = 100;

/// Errors from one asset download. All of them abandon the item only.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The candidate's source URL did not parse.
    #[error("invalid asset URL: {url}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
    },

    /// Transport-level failure fetching the asset.
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The asset URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP response from the asset host.
    #[error("HTTP {status} downloading {url}")]
    Status {
        /// The asset URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// Filesystem failure while writing the asset.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Downloaded body too small to be a real asset, on both extension
    /// variants.
    #[error("asset at {url} too small ({bytes} bytes)")]
    TooSmall {
        /// The asset URL last tried.
        url: String,
        /// Size of the rejected body.
        bytes: u64,
    },
}

/// Client for fetching original assets.
///
/// The HTTP transport is caller-configured (shared connection pool, proxy,
/// timeouts); this client only adds the request shape the asset host
/// requires.
#[derive(Debug, Clone)]
pub struct AssetClient {
    http: Client,
    referer_base: String,
}

impl AssetClient {
    /// Creates a client. `referer_base` is prefixed with the candidate id to
    /// form the referer header; the asset host rejects requests without it.
    #[must_use]
    pub fn new(http: Client, referer_base: String) -> Self {
        Self { http, referer_base }
    }

    /// Downloads `candidate` under `output_root/<bucket>/`, creating the
    /// bucket directory on demand.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] when both the primary and the
    /// alternate-extension fetch fail; no partial file remains in any case.
    pub async fn download(
        &self,
        candidate: &Candidate,
        output_root: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let url = resolve_original_url(&candidate.source_url)?;

        let dir = output_root.join(&candidate.bucket);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| DownloadError::Io {
                path: dir.clone(),
                source,
            })?;

        let path = dir.join(file_name_for(&candidate.id, &url));
        match self.fetch_to_file(&url, &path, &candidate.id).await {
            Err(DownloadError::TooSmall { .. }) => {}
            other => return other.map(|()| path),
        }

        // Primary variant was a stub body; try the other extension once.
        let Some(alternate) = alternate_extension_url(&url) else {
            return Err(DownloadError::TooSmall {
                url: url.to_string(),
                bytes: 0,
            });
        };
        debug!(id = %candidate.id, url = %alternate, "retrying with alternate extension");
        let path = dir.join(file_name_for(&candidate.id, &alternate));
        self.fetch_to_file(&alternate, &path, &candidate.id)
            .await
            .map(|()| path)
    }

    /// Streams one URL to one file. Any failure removes the partial file
    /// before returning.
    async fn fetch_to_file(
        &self,
        url: &Url,
        path: &Path,
        id: &str,
    ) -> Result<(), DownloadError> {
        let response = self
            .http
            .get(url.clone())
            .header(REFERER, format!("{}{id}", self.referer_base))
            .header(USER_AGENT, random_user_agent())
            .send()
            .await
            .map_err(|source| DownloadError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let file = File::create(path).await.map_err(|source| DownloadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(source) => {
                    remove_partial(path).await;
                    return Err(DownloadError::Network {
                        url: url.to_string(),
                        source,
                    });
                }
            };
            written += chunk.len() as u64;
            if let Err(source) = writer.write_all(&chunk).await {
                remove_partial(path).await;
                return Err(DownloadError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
        if let Err(source) = writer.flush().await {
            remove_partial(path).await;
            return Err(DownloadError::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        if written < MIN_VALID_BYTES {
            remove_partial(path).await;
            return Err(DownloadError::TooSmall {
                url: url.to_string(),
                bytes: written,
            });
        }
        Ok(())
    }
}

/// Rewrites a listing URL to the canonical page-zero original: the last path
/// segment's `_pN` page marker becomes `_p0`. URLs without a marker pass
/// through unchanged.
fn resolve_original_url(source: &str) -> Result<Url, DownloadError> {
    let mut url = Url::parse(source).map_err(|_| DownloadError::InvalidUrl {
        url: source.to_owned(),
    })?;
    if url.cannot_be_a_base() {
        return Err(DownloadError::InvalidUrl {
            url: source.to_owned(),
        });
    }

    let Some(segment) = url.path_segments().and_then(|mut s| s.next_back()) else {
        return Ok(url);
    };
    let Some((stem, rest)) = segment.split_once("_p") else {
        return Ok(url);
    };
    let Some((_page, ext)) = rest.split_once('.') else {
        return Ok(url);
    };
    let canonical = format!("{stem}_p0.{ext}");
    if canonical != segment {
        let canonical_path = {
            let mut segments: Vec<String> = url
                .path_segments()
                .map(|s| s.map(str::to_owned).collect())
                .unwrap_or_default();
            if let Some(last) = segments.last_mut() {
                *last = canonical;
            }
            segments.join("/")
        };
        url.set_path(&canonical_path);
    }
    Ok(url)
}

/// Toggles the extension between the two formats the asset host serves.
fn alternate_extension_url(url: &Url) -> Option<Url> {
    let path = url.path();
    let swapped = if let Some(stem) = path.strip_suffix(".jpg") {
        format!("{stem}.png")
    } else if let Some(stem) = path.strip_suffix(".png") {
        format!("{stem}.jpg")
    } else {
        return None;
    };
    let mut alternate = url.clone();
    alternate.set_path(&swapped);
    Some(alternate)
}

/// Local file name: `<id>.<ext>`, extension taken from the asset URL.
fn file_name_for(id: &str, url: &Url) -> String {
    let ext = url
        .path()
        .rsplit_once('.')
        .map_or("jpg", |(_, ext)| ext);
    format!("{id}.{ext}")
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to remove partial file");
    }
}
