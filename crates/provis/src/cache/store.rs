//! # Item Cache Store
//!
//! This module owns the on-disk layout of the cache and the marker-file
//! freshness test. The marker's content is informational; only its
//! filesystem last-write timestamp is compared against the remote item's
//! last-modified timestamp.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use crate::{cache::types::CacheStatus, error::ProvisError, item::validate_item_id};

/// Name of the sidecar file whose last-write time records a completed
/// download. Existing caches are keyed on this exact name.
pub const MARKER_FILE: &str = "__sample.config";

/// Directory name of the default cache root, shared with earlier tooling
/// that provisioned the same items.
const DEFAULT_DIR_NAME: &str = "ArcGISRuntimeSampleData";

/// Filesystem store for provisioned items
#[derive(Debug, Clone)]
pub struct ItemCache {
    root: PathBuf,
}

impl ItemCache {
    /// Create a store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store at the per-user default location
    pub fn at_default_root() -> Self {
        Self::new(Self::default_root())
    }

    /// The per-user default cache root
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(DEFAULT_DIR_NAME)
    }

    /// The cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the cache root if it does not exist yet
    pub async fn ensure_root(&self) -> Result<(), ProvisError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Directory holding one item's payload and expanded content
    pub fn item_dir(&self, item_id: &str) -> PathBuf {
        self.root.join(item_id)
    }

    /// Path of the item's download marker
    pub fn marker_path(&self, item_id: &str) -> PathBuf {
        self.item_dir(item_id).join(MARKER_FILE)
    }

    /// Deterministic path of a file inside an item's directory.
    ///
    /// Pure path arithmetic; nothing is checked for existence.
    pub fn local_path<I, S>(&self, item_id: &str, parts: I) -> PathBuf
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut path = self.item_dir(item_id);
        for part in parts {
            path.push(part);
        }
        path
    }

    /// Compare the item's marker against the remote last-modified
    /// timestamp
    pub async fn status(
        &self,
        item_id: &str,
        remote_modified: DateTime<Utc>,
    ) -> Result<CacheStatus, ProvisError> {
        validate_item_id(item_id)?;

        let marker = self.marker_path(item_id);
        if !fs::try_exists(&marker).await? {
            return Ok(CacheStatus::Absent);
        }

        let downloaded: DateTime<Utc> = fs::metadata(&marker).await?.modified()?.into();
        let status = if downloaded >= remote_modified {
            CacheStatus::Fresh
        } else {
            CacheStatus::Stale
        };

        debug!(
            item_id,
            %status,
            downloaded = %downloaded.to_rfc3339(),
            remote_modified = %remote_modified.to_rfc3339(),
            "Checked cache marker"
        );
        Ok(status)
    }

    /// True when a marker exists for the item, regardless of freshness
    pub async fn has_marker(&self, item_id: &str) -> Result<bool, ProvisError> {
        validate_item_id(item_id)?;
        Ok(fs::try_exists(self.marker_path(item_id)).await?)
    }

    /// Write the item's download marker.
    ///
    /// Callers invoke this only once the payload and any archive
    /// expansion are complete; the marker's write time is what makes the
    /// entry count as downloaded.
    pub async fn stamp(&self, item_id: &str) -> Result<(), ProvisError> {
        validate_item_id(item_id)?;

        let dir = self.item_dir(item_id);
        fs::create_dir_all(&dir).await?;

        let marker = self.marker_path(item_id);
        let content = format!("Data downloaded: {}", Utc::now().to_rfc3339());
        fs::write(&marker, content).await?;

        debug!(path = ?marker, "Wrote download marker");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn temp_cache() -> (tempfile::TempDir, ItemCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ItemCache::new(dir.path());
        (dir, cache)
    }

    #[test]
    fn test_layout_paths() {
        let cache = ItemCache::new("/tmp/cache");
        assert_eq!(
            cache.marker_path("abc"),
            PathBuf::from("/tmp/cache/abc/__sample.config")
        );
        assert_eq!(
            cache.local_path("abc", ["sub", "b.txt"]),
            PathBuf::from("/tmp/cache/abc/sub/b.txt")
        );
        assert_eq!(
            cache.local_path("abc", Vec::<&str>::new()),
            PathBuf::from("/tmp/cache/abc")
        );
    }

    #[tokio::test]
    async fn test_status_absent_without_marker() {
        let (_dir, cache) = temp_cache();
        let status = cache.status("abc", Utc::now()).await.unwrap();
        assert_eq!(status, CacheStatus::Absent);
    }

    #[tokio::test]
    async fn test_status_fresh_when_marker_is_newer() {
        let (_dir, cache) = temp_cache();
        cache.stamp("abc").await.unwrap();

        let remote = Utc::now() - Duration::hours(1);
        let status = cache.status("abc", remote).await.unwrap();
        assert_eq!(status, CacheStatus::Fresh);
    }

    #[tokio::test]
    async fn test_status_stale_when_remote_is_newer() {
        let (_dir, cache) = temp_cache();
        cache.stamp("abc").await.unwrap();

        let remote = Utc::now() + Duration::hours(1);
        let status = cache.status("abc", remote).await.unwrap();
        assert_eq!(status, CacheStatus::Stale);
    }

    #[tokio::test]
    async fn test_stamp_writes_readable_content() {
        let (_dir, cache) = temp_cache();
        cache.stamp("abc").await.unwrap();

        let content = fs::read_to_string(cache.marker_path("abc")).await.unwrap();
        assert!(content.starts_with("Data downloaded: "));
    }

    #[tokio::test]
    async fn test_invalid_id_is_rejected() {
        let (_dir, cache) = temp_cache();
        assert!(matches!(
            cache.status("../abc", Utc::now()).await,
            Err(ProvisError::InvalidItemId(_))
        ));
        assert!(matches!(
            cache.stamp("").await,
            Err(ProvisError::InvalidItemId(_))
        ));
    }
}
