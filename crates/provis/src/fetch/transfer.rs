//! # Payload Transfer
//!
//! Streams an item's payload to disk chunk by chunk. The shared
//! cancellation token is polled between chunks, so a cancelled transfer
//! stops within one chunk and leaves the partial file behind for a later
//! resume attempt.

use std::path::Path;

use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::ProvisError,
    item::{ItemDescriptor, ItemSource, ItemStream},
    progress::{OnProgress, ProgressEvent, TransferProgress},
};

/// Write the item's payload to `dest` and return the number of bytes on
/// disk. A partial file at `dest` is offered to the source for resuming;
/// sources that cannot resume restart from offset zero and the file is
/// rewritten.
pub(crate) async fn transfer_payload<S: ItemSource + ?Sized>(
    source: &S,
    item: &ItemDescriptor,
    dest: &Path,
    cancel: &CancellationToken,
    on_progress: Option<&OnProgress>,
) -> Result<u64, ProvisError> {
    let resume_from = match tokio::fs::metadata(dest).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
        _ => None,
    };

    let opened = match resume_from {
        Some(offset) => source.open_from(item, offset).await?,
        None => source.open(item).await?,
    };
    let ItemStream {
        mut stream,
        total_bytes,
        offset,
    } = opened;

    let mut file = if offset > 0 {
        // Appending is only sound when the stream starts exactly where
        // the partial file ends
        if resume_from != Some(offset) {
            return Err(ProvisError::IoError(std::io::Error::other(format!(
                "source resumed at byte {offset} but {} bytes are on disk",
                resume_from.unwrap_or(0)
            ))));
        }
        debug!(path = ?dest, offset, "Appending to partial payload");
        OpenOptions::new().append(true).open(dest).await?
    } else {
        File::create(dest).await?
    };

    if let Some(callback) = on_progress {
        callback(ProgressEvent::Started {
            item_id: item.id.clone(),
            total_bytes,
        });
    }

    let mut written = offset;
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(item_id = %item.id, bytes = written, "Transfer cancelled");
                return Err(ProvisError::Cancelled);
            }
            chunk = stream.next() => chunk,
        };

        let Some(chunk) = chunk else {
            break;
        };
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;

        if let Some(callback) = on_progress {
            callback(ProgressEvent::Transferred {
                item_id: item.id.clone(),
                progress: TransferProgress {
                    bytes_transferred: written,
                    total_bytes,
                },
            });
        }
    }

    file.flush().await?;
    debug!(path = ?dest, bytes = written, "Payload written");
    Ok(written)
}
