//! # Fetch Job
//!
//! The per-item unit of work: payload directory, transfer, optional
//! archive expansion, then the download marker, strictly in that order.

use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::{
    cache::ItemCache,
    error::ProvisError,
    fetch::{transfer, unpack},
    item::{ItemDescriptor, ItemSource, sanitize_file_name},
    progress::{OnProgress, ProgressEvent},
};

/// Download one item into the cache and stamp its marker.
///
/// The marker is written only once every earlier stage has succeeded.
/// Failures and cancellations leave at most a partial payload behind,
/// which the freshness check never mistakes for a completed download.
#[instrument(skip_all, fields(item_id = %item.id), level = "debug")]
pub(crate) async fn run<S: ItemSource + ?Sized>(
    source: &S,
    cache: &ItemCache,
    item: &ItemDescriptor,
    cancel: &CancellationToken,
    on_progress: Option<&OnProgress>,
) -> Result<(), ProvisError> {
    if cancel.is_cancelled() {
        return Err(ProvisError::Cancelled);
    }

    let item_dir = cache.item_dir(&item.id);
    fs::create_dir_all(&item_dir).await?;

    let file_name = sanitize_file_name(&item.name);
    let dest = item_dir.join(file_name);

    // A marker means any file at `dest` is a completed earlier payload,
    // not a resumable partial. Re-downloads replace the entry wholesale,
    // so the old payload goes before the transfer starts; only genuine
    // interrupted partials (no marker) are offered for resuming.
    if cache.has_marker(&item.id).await? {
        match fs::remove_file(&dest).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    let bytes = transfer::transfer_payload(source, item, &dest, cancel, on_progress).await?;

    if unpack::is_archive(file_name) {
        unpack::expand_archive(dest, item_dir.clone(), cancel.clone()).await?;
    }

    if cancel.is_cancelled() {
        return Err(ProvisError::Cancelled);
    }
    cache.stamp(&item.id).await?;

    if let Some(callback) = on_progress {
        callback(ProgressEvent::Completed {
            item_id: item.id.clone(),
        });
    }

    info!(item_id = %item.id, bytes, "Item provisioned");
    Ok(())
}
