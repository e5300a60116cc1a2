//! # Provisioner
//!
//! Batch orchestration over an [`ItemSource`] and an [`ItemCache`]:
//! resolve metadata, compare cache markers, and run the download jobs
//! that are actually needed, all under one shared cancellation token.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    cache::{CacheStatus, ItemCache},
    error::ProvisError,
    fetch::job,
    item::{ItemDescriptor, ItemSource},
    progress::OnProgress,
};

/// Coordinates freshness checks and concurrent downloads for a set of
/// portal items
pub struct Provisioner<S> {
    source: Arc<S>,
    cache: ItemCache,
}

impl<S: ItemSource> Provisioner<S> {
    /// Create a provisioner caching at the default per-user root
    pub fn new(source: S) -> Self {
        Self::with_cache(source, ItemCache::at_default_root())
    }

    /// Create a provisioner over a specific cache store
    pub fn with_cache(source: S, cache: ItemCache) -> Self {
        Self {
            source: Arc::new(source),
            cache,
        }
    }

    /// The underlying item source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The underlying cache store
    pub fn cache(&self) -> &ItemCache {
        &self.cache
    }

    /// Deterministic local path for an item's content.
    ///
    /// Pure path arithmetic; the caller is expected to have awaited
    /// [`ensure_present`](Self::ensure_present) first.
    pub fn local_path<I, P>(&self, item_id: &str, parts: I) -> PathBuf
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.cache.local_path(item_id, parts)
    }

    /// Ensure every listed item has a fresh local copy.
    ///
    /// Duplicate ids are collapsed before scheduling. Stale and missing
    /// items download concurrently; the call returns once every job has
    /// finished, with the first failure if any job failed, or with
    /// [`ProvisError::Cancelled`] as soon as the token fires.
    pub async fn ensure_present<I, T>(
        &self,
        item_ids: I,
        cancel: CancellationToken,
    ) -> Result<(), ProvisError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.ensure_present_with_progress(item_ids, cancel, None)
            .await
    }

    /// [`ensure_present`](Self::ensure_present) with a progress callback
    /// receiving per-item transfer events
    #[instrument(skip_all, level = "debug")]
    pub async fn ensure_present_with_progress<I, T>(
        &self,
        item_ids: I,
        cancel: CancellationToken,
        on_progress: Option<OnProgress>,
    ) -> Result<(), ProvisError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.cache.ensure_root().await?;

        // Collapse duplicates, first occurrence wins
        let mut seen = HashSet::new();
        let unique: Vec<String> = item_ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .filter(|id| seen.insert(id.clone()))
            .collect();

        // Jobs hold a child token so an enqueue failure can stop them
        // without cancelling the caller's token
        let cancel = cancel.child_token();

        let mut jobs = FuturesUnordered::new();
        let mut enqueue_error: Option<ProvisError> = None;
        for item_id in unique {
            if cancel.is_cancelled() {
                enqueue_error = Some(ProvisError::Cancelled);
                break;
            }

            let item = match self.resolve_if_stale(&item_id, &cancel).await {
                Ok(Some(item)) => item,
                Ok(None) => continue,
                Err(e) => {
                    enqueue_error = Some(e);
                    break;
                }
            };

            let source = Arc::clone(&self.source);
            let cache = self.cache.clone();
            let job_cancel = cancel.clone();
            let job_progress = on_progress.clone();
            jobs.push(tokio::spawn(async move {
                job::run(
                    source.as_ref(),
                    &cache,
                    &item,
                    &job_cancel,
                    job_progress.as_ref(),
                )
                .await
            }));
        }

        if let Some(error) = enqueue_error {
            // Stop the jobs spawned so far and let each observe the
            // token before the failure surfaces, so no marker can land
            // after the batch has reported it
            cancel.cancel();
            while let Some(joined) = jobs.next().await {
                if let Err(join_error) = joined {
                    warn!(error = %join_error, "Download job panicked or was aborted");
                }
            }
            return Err(error);
        }

        if jobs.is_empty() {
            debug!("All items already provisioned");
            return Ok(());
        }

        let total = jobs.len();
        info!(count = total, "Waiting for download jobs");

        let mut first_error: Option<ProvisError> = None;
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Spawned jobs are not aborted here; each observes the
                    // token at its next suspension point and stops short
                    // of the marker write
                    warn!("Batch cancelled, abandoning in-flight downloads");
                    return Err(ProvisError::Cancelled);
                }
                joined = jobs.next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if e.is_cancelled() {
                        debug!("Download job observed cancellation");
                    } else {
                        warn!(error = %e, "Download job failed");
                    }
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_error) => {
                    warn!(error = %join_error, "Download job panicked or was aborted");
                    if first_error.is_none() {
                        first_error = Some(join_error.into());
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => {
                info!(count = total, "All items provisioned");
                Ok(())
            }
        }
    }

    /// Ensure a single item has a fresh local copy
    #[instrument(skip(self, cancel), level = "debug")]
    pub async fn ensure_item(
        &self,
        item_id: &str,
        cancel: CancellationToken,
    ) -> Result<(), ProvisError> {
        self.cache.ensure_root().await?;

        let Some(item) = self.resolve_if_stale(item_id, &cancel).await? else {
            return Ok(());
        };
        job::run(self.source.as_ref(), &self.cache, &item, &cancel, None).await
    }

    /// Report whether a valid local copy of the item exists.
    ///
    /// When a marker exists but the remote store cannot be reached, the
    /// cached copy is trusted so callers keep working offline.
    pub async fn is_present(&self, item_id: &str) -> Result<bool, ProvisError> {
        if !self.cache.has_marker(item_id).await? {
            return Ok(false);
        }

        match self.source.resolve(item_id).await {
            Ok(item) => Ok(self.cache.status(&item.id, item.modified).await?.is_fresh()),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(item_id, error = %e, "Metadata lookup failed, trusting cached copy");
                Ok(true)
            }
        }
    }

    /// True when every listed item already has a fresh local copy
    pub async fn has_present<I, T>(&self, item_ids: I) -> Result<bool, ProvisError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        for item_id in item_ids {
            if !self.is_present(item_id.as_ref()).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Resolve an item and report it only when a download is required
    async fn resolve_if_stale(
        &self,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ItemDescriptor>, ProvisError> {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProvisError::Cancelled),
            resolved = self.source.resolve(item_id) => resolved?,
        };

        match self.cache.status(&item.id, item.modified).await? {
            CacheStatus::Fresh => {
                debug!(item_id = %item.id, "Cache entry is fresh, skipping download");
                Ok(None)
            }
            status => {
                debug!(item_id = %item.id, %status, "Download required");
                Ok(Some(item))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_tracing;
    use crate::progress::ProgressEvent;
    use crate::test_utils::{MockPayload, MockSource, zip_payload};
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_provisioner(source: MockSource) -> (tempfile::TempDir, Provisioner<MockSource>) {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = Provisioner::with_cache(source, ItemCache::new(dir.path()));
        (dir, provisioner)
    }

    #[tokio::test]
    async fn test_fresh_item_is_not_downloaded_twice() {
        let source = MockSource::with_item("x", "data.bin", MockPayload::Bytes(b"payload".into()));
        let (_dir, provisioner) = temp_provisioner(source);

        provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provisioner.source().open_count(), 1);

        // Remote timestamp unchanged: the marker wins
        provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provisioner.source().open_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_item_is_downloaded_again() {
        let source = MockSource::with_item("x", "data.bin", MockPayload::Bytes(b"payload".into()));
        let (_dir, provisioner) = temp_provisioner(source);

        provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provisioner.source().open_count(), 1);

        // Remote item changed after the marker was written
        provisioner
            .source()
            .set_modified("x", Utc::now() + Duration::hours(1));
        provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provisioner.source().open_count(), 2);
        assert!(provisioner.cache().has_marker("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_marker() {
        let source =
            MockSource::with_item("x", "data.bin", MockPayload::FailAfter(b"partial".into()));
        let (_dir, provisioner) = temp_provisioner(source);

        let result = provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ProvisError::IoError(_))));
        assert!(!provisioner.cache().has_marker("x").await.unwrap());

        // The next run starts over and heals the entry
        provisioner.source().insert(
            "x",
            "data.bin",
            Utc::now() - Duration::hours(1),
            MockPayload::Bytes(b"complete".into()),
        );
        provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await
            .unwrap();
        assert!(provisioner.cache().has_marker("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_zip_payload_is_expanded_in_place() {
        let payload = zip_payload(&[("a.txt", b"alpha"), ("sub/b.txt", b"beta")]);
        let source = MockSource::with_item("x", "data.zip", MockPayload::Bytes(payload));
        let (_dir, provisioner) = temp_provisioner(source);

        provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await
            .unwrap();

        let a = tokio::fs::read(provisioner.local_path("x", ["a.txt"]))
            .await
            .unwrap();
        let b = tokio::fs::read(provisioner.local_path("x", ["sub", "b.txt"]))
            .await
            .unwrap();
        assert_eq!(a, b"alpha");
        assert_eq!(b, b"beta");
        assert!(provisioner.cache().has_marker("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_cancellation_reports_cancelled_and_writes_no_markers() {
        init_test_tracing!();
        let source = MockSource::new();
        source.insert(
            "x",
            "x.bin",
            Utc::now() - Duration::hours(1),
            MockPayload::Stall(b"x-first-chunk".into()),
        );
        source.insert(
            "y",
            "y.bin",
            Utc::now() - Duration::hours(1),
            MockPayload::Stall(b"y-first-chunk".into()),
        );
        let (_dir, provisioner) = temp_provisioner(source);

        // Cancel once both transfers have started
        let cancel = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));
        let on_progress = {
            let cancel = cancel.clone();
            let started = Arc::clone(&started);
            Arc::new(move |event: ProgressEvent| {
                if matches!(event, ProgressEvent::Started { .. })
                    && started.fetch_add(1, Ordering::SeqCst) + 1 == 2
                {
                    cancel.cancel();
                }
            }) as OnProgress
        };

        let result = provisioner
            .ensure_present_with_progress(["x", "y"], cancel, Some(on_progress))
            .await;

        assert!(matches!(result, Err(ProvisError::Cancelled)));
        assert!(!provisioner.cache().has_marker("x").await.unwrap());
        assert!(!provisioner.cache().has_marker("y").await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_redownload_replaces_payload_wholesale() {
        let source = MockSource::with_item("x", "data.bin", MockPayload::Bytes(b"AAAA".into()));
        source.set_resumable(true);
        let (_dir, provisioner) = temp_provisioner(source);

        provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await
            .unwrap();
        let payload = provisioner.local_path("x", ["data.bin"]);
        assert_eq!(tokio::fs::read(&payload).await.unwrap(), b"AAAA");

        // Remote entity replaced with longer content; the old payload
        // must not survive as a prefix of the new one
        provisioner.source().insert(
            "x",
            "data.bin",
            Utc::now() + Duration::hours(1),
            MockPayload::Bytes(b"BBBBBB".into()),
        );
        provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&payload).await.unwrap(), b"BBBBBB");

        // And again with shorter content, where a ranged request past
        // the end could not even be satisfied
        provisioner.source().insert(
            "x",
            "data.bin",
            Utc::now() + Duration::hours(2),
            MockPayload::Bytes(b"C".into()),
        );
        provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&payload).await.unwrap(), b"C");
    }

    #[tokio::test]
    async fn test_interrupted_partial_is_resumed_without_marker() {
        let source =
            MockSource::with_item("x", "data.bin", MockPayload::Bytes(b"first-second".into()));
        source.set_resumable(true);
        let (_dir, provisioner) = temp_provisioner(source);

        // A genuine partial from an interrupted run: payload bytes on
        // disk, no marker
        let item_dir = provisioner.cache().item_dir("x");
        tokio::fs::create_dir_all(&item_dir).await.unwrap();
        tokio::fs::write(item_dir.join("data.bin"), b"first-")
            .await
            .unwrap();

        provisioner
            .ensure_present(["x"], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            tokio::fs::read(provisioner.local_path("x", ["data.bin"]))
                .await
                .unwrap(),
            b"first-second"
        );
        // The transfer picked up at the partial's length
        assert_eq!(provisioner.source().resume_offsets(), vec![6]);
        assert!(provisioner.cache().has_marker("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_failure_stops_in_flight_jobs() {
        let source = MockSource::new();
        source.insert(
            "slow",
            "slow.bin",
            Utc::now() - Duration::hours(1),
            MockPayload::Delayed(b"slow-payload".into()),
        );
        let (_dir, provisioner) = temp_provisioner(source);

        // The second id fails to resolve while the first is in flight
        let result = provisioner
            .ensure_present(["slow", "missing"], CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ProvisError::ItemNotFound(_))));
        assert!(!provisioner.cache().has_marker("slow").await.unwrap());

        // The abandoned job observed the batch token; no marker lands
        // after the failure was reported
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!provisioner.cache().has_marker("slow").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_ids_download_once() {
        let source = MockSource::with_item("x", "data.bin", MockPayload::Bytes(b"payload".into()));
        let (_dir, provisioner) = temp_provisioner(source);

        provisioner
            .ensure_present(["x", "x", "x"], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provisioner.source().resolve_count(), 1);
        assert_eq!(provisioner.source().open_count(), 1);
        assert!(provisioner.cache().has_marker("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_with_no_ids_is_a_no_op() {
        let (_dir, provisioner) = temp_provisioner(MockSource::new());
        provisioner
            .ensure_present(Vec::<String>::new(), CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ensure_item_then_is_present() {
        let source = MockSource::with_item("x", "data.bin", MockPayload::Bytes(b"payload".into()));
        let (_dir, provisioner) = temp_provisioner(source);

        assert!(!provisioner.is_present("x").await.unwrap());
        provisioner
            .ensure_item("x", CancellationToken::new())
            .await
            .unwrap();
        assert!(provisioner.is_present("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_cached_copy_is_trusted_when_lookup_fails() {
        let source = MockSource::with_item("x", "data.bin", MockPayload::Bytes(b"payload".into()));
        let (_dir, provisioner) = temp_provisioner(source);

        provisioner
            .ensure_item("x", CancellationToken::new())
            .await
            .unwrap();

        // Remote store no longer knows the item; the marker still counts
        provisioner.source().remove("x");
        assert!(provisioner.is_present("x").await.unwrap());

        // Without a marker there is nothing to trust
        assert!(!provisioner.is_present("never-fetched").await.unwrap());
    }

    #[tokio::test]
    async fn test_has_present_requires_every_item() {
        let source = MockSource::new();
        source.insert(
            "x",
            "x.bin",
            Utc::now() - Duration::hours(1),
            MockPayload::Bytes(b"x".into()),
        );
        source.insert(
            "y",
            "y.bin",
            Utc::now() - Duration::hours(1),
            MockPayload::Bytes(b"y".into()),
        );
        let (_dir, provisioner) = temp_provisioner(source);

        provisioner
            .ensure_item("x", CancellationToken::new())
            .await
            .unwrap();
        assert!(!provisioner.has_present(["x", "y"]).await.unwrap());

        provisioner
            .ensure_item("y", CancellationToken::new())
            .await
            .unwrap();
        assert!(provisioner.has_present(["x", "y"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_failure_is_reported_after_drain() {
        let source = MockSource::new();
        source.insert(
            "good",
            "good.bin",
            Utc::now() - Duration::hours(1),
            MockPayload::Bytes(b"fine".into()),
        );
        source.insert(
            "bad",
            "bad.bin",
            Utc::now() - Duration::hours(1),
            MockPayload::FailAfter(b"oops".into()),
        );
        let (_dir, provisioner) = temp_provisioner(source);

        let result = provisioner
            .ensure_present(["good", "bad"], CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ProvisError::IoError(_))));

        // The healthy sibling still completed
        assert!(provisioner.cache().has_marker("good").await.unwrap());
        assert!(!provisioner.cache().has_marker("bad").await.unwrap());
    }
}
