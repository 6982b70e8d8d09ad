//! Staleness check and concurrent catalog rebuilds
//!
//! Every run of a catalog goes through these phases, strictly in order:
//!
//! ```text
//! CHECK_LATEST --(latest == current)--> STAMP_FRESH --> done
//! CHECK_LATEST --(changed)--> DOWNLOAD --> PARSE_STORE --> COMMIT_METADATA --> done
//! ```
//!
//! A failure after CHECK_LATEST leaves the metadata untouched, so the next
//! run retries a full rebuild. A failed CHECK_LATEST writes nothing.
//!
//! [`run_indexing`] starts one task per catalog and returns a
//! [`CompletionStream`] yielding each catalog's result as soon as it is
//! done. Catalogs share no state: one failing never delays or aborts another.

use crate::cancel::CancellationToken;
use crate::catalog::Catalog;
use crate::config::IndexerConfig;
use crate::error::{CatalogError, Result};
use crate::fetch::ReleaseStream;
use crate::metadata::CatalogMetadata;
use chrono::Utc;
use futures::Stream;
use pkgcat_storage::{AtomicFile, IndexStats, StoreConfig, open_store};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The source had not changed; only the timestamp was refreshed
    Unchanged {
        /// Release that is still current
        release: String,
    },
    /// The store was rebuilt from a new release
    Rebuilt {
        /// Release now indexed
        release: String,
        /// Rebuild counters
        stats: IndexStats,
    },
}

/// Result of one catalog's run
#[derive(Debug)]
pub struct IndexingResult {
    /// Catalog name
    pub catalog: String,
    /// Outcome, or the error that stopped the run
    pub result: Result<IndexOutcome>,
}

/// Catalogs whose last indexing is older than `interval`.
///
/// Catalogs that were never indexed are always included. Order follows
/// `catalogs`.
pub async fn catalogs_needing_indexing<S: AsRef<str>>(
    config: &IndexerConfig,
    catalogs: &[S],
    interval: Duration,
) -> Result<Vec<String>> {
    let now = Utc::now();
    let mut stale = Vec::new();

    for name in catalogs {
        let name = name.as_ref();
        let metadata = CatalogMetadata::read(&config.metadata_path(name)).await?;
        if metadata.is_stale(now, interval) {
            debug!(
                catalog = %name,
                last_indexed_at = %metadata.last_indexed_at,
                "Catalog is stale"
            );
            stale.push(name.to_string());
        }
    }

    Ok(stale)
}

/// Index every catalog concurrently.
///
/// Must be called within a Tokio runtime. Each catalog runs in its own task,
/// created for this run only. The returned stream yields one
/// [`IndexingResult`] per catalog in completion order and ends once all of
/// them are done. Dropping the stream does not stop the tasks; use `cancel`.
pub fn run_indexing(
    config: &IndexerConfig,
    catalogs: Vec<Catalog>,
    cancel: CancellationToken,
) -> CompletionStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let total = catalogs.len();

    for catalog in catalogs {
        let tx = tx.clone();
        let config = config.clone();
        let cancel = cancel.clone();
        let name = catalog.name().to_string();

        tokio::spawn(async move {
            // A panic inside the run surfaces as this catalog's error only.
            let run =
                tokio::spawn(async move { index_catalog(&config, &catalog, &cancel).await });
            let result = run
                .await
                .unwrap_or_else(|e| Err(CatalogError::TaskFailed(e)));

            match &result {
                Ok(outcome) => debug!(catalog = %name, ?outcome, "Catalog finished"),
                Err(e) => warn!(catalog = %name, error = %e, "Catalog failed"),
            }
            // The caller may have stopped listening.
            let _ = tx.send(IndexingResult {
                catalog: name,
                result,
            });
        });
    }

    CompletionStream {
        rx,
        remaining: total,
    }
}

/// Run the state machine for one catalog.
async fn index_catalog(
    config: &IndexerConfig,
    catalog: &Catalog,
    cancel: &CancellationToken,
) -> Result<IndexOutcome> {
    let name = catalog.name();
    let metadata_path = config.metadata_path(name);
    let current = CatalogMetadata::read(&metadata_path).await?;

    debug!(catalog = %name, current = %current.curr_release, "Checking latest release");
    let latest = catalog
        .fetcher()
        .latest_release(cancel, &current)
        .await
        .map_err(CatalogError::LatestRelease)?;

    if latest == current.curr_release {
        info!(catalog = %name, release = %latest, "Release unchanged");
        CatalogMetadata::fresh(latest.as_str())
            .write(&metadata_path)
            .await?;
        return Ok(IndexOutcome::Unchanged { release: latest });
    }

    if cancel.is_cancelled() {
        return Err(CatalogError::Cancelled);
    }

    info!(catalog = %name, from = %current.curr_release, to = %latest, "Downloading release");
    let source = catalog
        .fetcher()
        .download_release(cancel, &latest)
        .await
        .map_err(|source| CatalogError::Download {
            release: latest.clone(),
            source,
        })?;

    let store_config = config.store_config(name);
    let key_log = config.key_log_path(name);
    let stats =
        tokio::task::spawn_blocking(move || rebuild(&store_config, &key_log, source)).await??;

    CatalogMetadata::fresh(latest.as_str())
        .write(&metadata_path)
        .await?;
    info!(
        catalog = %name,
        release = %latest,
        records = stats.records,
        keys = stats.keys,
        "Catalog indexed"
    );

    Ok(IndexOutcome::Rebuilt {
        release: latest,
        stats,
    })
}

/// PARSE_STORE: rebuild the store and replace the key log.
///
/// The new key log only replaces the old one after the store was rebuilt.
fn rebuild(
    store_config: &StoreConfig,
    key_log: &Path,
    mut source: ReleaseStream,
) -> Result<IndexStats> {
    let mut store = open_store(store_config)?;
    let mut keys = BufWriter::new(AtomicFile::create(key_log)?);

    let indexed = store.index(&mut source, &mut keys);
    let closed = store.close();
    let stats = indexed?;
    closed?;

    keys.flush()?;
    let keys = keys.into_inner().map_err(|e| e.into_error())?;
    keys.commit()?;
    Ok(stats)
}

/// Results of an indexing run, in completion order.
///
/// Also usable as a [`futures::Stream`].
#[derive(Debug)]
pub struct CompletionStream {
    rx: mpsc::UnboundedReceiver<IndexingResult>,
    remaining: usize,
}

impl CompletionStream {
    /// Wait for the next catalog to finish; `None` once all have.
    pub async fn recv(&mut self) -> Option<IndexingResult> {
        let result = self.rx.recv().await;
        if result.is_some() {
            self.remaining = self.remaining.saturating_sub(1);
        }
        result
    }

    /// Catalogs that have not reported yet
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Wait for every catalog and return all results.
    pub async fn collect_all(mut self) -> Vec<IndexingResult> {
        let mut results = Vec::with_capacity(self.remaining);
        while let Some(result) = self.recv().await {
            results.push(result);
        }
        results
    }
}

impl Stream for CompletionStream {
    type Item = IndexingResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.rx.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &polled {
            this.remaining = this.remaining.saturating_sub(1);
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
