//! Seen-id tracking and the append-only id log.
//!
//! The log is a flat file of `<id><space>` tokens, appended after every
//! successful download and loaded once at session startup so reruns skip
//! material already on disk. A single writer task owns the file handle for
//! the whole run; all appends funnel through its queue, so partial writes
//! never interleave. The log is never rewritten or compacted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the cache writer queue.
const CACHE_QUEUE_CAP: usize = 32;

/// Errors from opening or reading the id log.
#[derive(Debug, thiserror::Error)]
pub enum MemoError {
    /// The log could not be opened or read at startup. Fatal for the run.
    #[error("cannot open id log {path}: {source}")]
    Io {
        /// Log path that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Set of ids already downloaded in this run (and, unless re-crawl is
/// enabled, in prior runs).
///
/// One mutex guards the set; every membership decision is a single
/// check-and-set under that lock, never a read followed by a separate write.
#[derive(Debug, Default)]
pub struct SeenSet {
    ids: Mutex<HashSet<String>>,
}

impl SeenSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set pre-populated with `ids`.
    #[must_use]
    pub fn with_ids(ids: HashSet<String>) -> Self {
        Self {
            ids: Mutex::new(ids),
        }
    }

    /// Atomically records `id`, returning `true` if it was not yet present.
    ///
    /// The caller that receives `true` owns the right to download that id;
    /// everyone else must skip it.
    pub async fn check_and_insert(&self, id: &str) -> bool {
        let mut ids = self.ids.lock().await;
        ids.insert(id.to_owned())
    }

    /// Non-mutating membership probe, used by the graph walk to avoid
    /// spending classification calls on ids that can no longer be dispatched.
    pub async fn contains(&self, id: &str) -> bool {
        self.ids.lock().await.contains(id)
    }

    /// Number of recorded ids.
    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    /// Whether no id has been recorded yet.
    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }
}

/// Loads the persisted id log into a set.
///
/// The format is whitespace-delimited ids with no trailing structure;
/// anything unparseable at the tail (for example a partial final token from
/// a crash mid-append, which whole-token parsing still accepts as an id, or
/// invalid UTF-8) is dropped rather than failing the run. A missing file is
/// an empty history.
///
/// # Errors
///
/// Returns [`MemoError::Io`] only when the file exists but cannot be read.
pub async fn load_seen_ids(path: &Path) -> Result<HashSet<String>, MemoError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(source) => {
            return Err(MemoError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    // Invalid UTF-8 can only come from a torn write at the tail; keep the
    // valid prefix.
    let text = String::from_utf8_lossy(&bytes);
    let ids: HashSet<String> = text
        .split_whitespace()
        .filter(|token| !token.is_empty() && !token.contains('\u{FFFD}'))
        .map(str::to_owned)
        .collect();

    debug!(path = %path.display(), count = ids.len(), "loaded id log");
    Ok(ids)
}

/// Handle to the single log-appender task.
///
/// Dropping the [`CacheWriter`] (the sender side) closes the queue; await
/// [`CacheWriterHandle::finish`] afterwards to make sure the final flush
/// happened before the process exits.
#[derive(Debug, Clone)]
pub struct CacheWriter {
    tx: mpsc::Sender<String>,
}

/// Join handle for the writer task.
#[derive(Debug)]
pub struct CacheWriterHandle {
    task: JoinHandle<()>,
}

impl CacheWriter {
    /// Opens `path` in append mode and spawns the writer task.
    ///
    /// # Errors
    ///
    /// Returns [`MemoError::Io`] if the log cannot be opened for append;
    /// this is fatal at session startup.
    pub async fn spawn(path: &Path) -> Result<(Self, CacheWriterHandle), MemoError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| MemoError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let (tx, mut rx) = mpsc::channel::<String>(CACHE_QUEUE_CAP);
        let log_path = path.to_path_buf();
        let task = tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                if let Err(e) = file.write_all(format!("{id} ").as_bytes()).await {
                    warn!(id = %id, error = %e, "failed to append id to log");
                }
            }
            if let Err(e) = file.flush().await {
                warn!(path = %log_path.display(), error = %e, "failed to flush id log");
            }
            debug!(path = %log_path.display(), "id log writer stopped");
        });

        Ok((Self { tx }, CacheWriterHandle { task }))
    }

    /// Queues an id for appending. A full queue applies backpressure to the
    /// reporting download task; a closed queue (shutdown already past the
    /// drain point) drops the id with a warning rather than erroring.
    pub async fn record(&self, id: String) {
        if let Err(e) = self.tx.send(id).await {
            warn!(id = %e.0, "id log queue closed before append");
        }
    }
}

impl CacheWriterHandle {
    /// Waits for the writer task to drain its queue and flush.
    pub async fn finish(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "id log writer task panicked");
        }
    }
}

/// Convenience: loads the log honoring the re-crawl toggle.
///
/// With `allow_recrawl` the run starts with an empty set (prior ids become
/// eligible again) while still appending new downloads to the same log.
///
/// # Errors
///
/// Propagates [`MemoError::Io`] from [`load_seen_ids`].
pub async fn load_seen_set(path: &Path, allow_recrawl: bool) -> Result<Arc<SeenSet>, MemoError> {
    if allow_recrawl {
        // Read anyway so an unreadable log still fails loudly at startup.
        let _ = load_seen_ids(path).await?;
        return Ok(Arc::new(SeenSet::new()));
    }
    Ok(Arc::new(SeenSet::with_ids(load_seen_ids(path).await?)))
}
