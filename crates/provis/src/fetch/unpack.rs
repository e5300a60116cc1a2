//! # Archive Expansion
//!
//! Expands a downloaded `.zip` payload into the item directory. The zip
//! machinery is synchronous, so the work runs on the blocking thread
//! pool, checking the cancellation token between entries.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use zip::ZipArchive;

use crate::error::ProvisError;

/// True when the payload file name calls for archive expansion
pub(crate) fn is_archive(file_name: &str) -> bool {
    file_name.ends_with(".zip")
}

/// Expand `archive_path` into `dest_dir`, overwriting existing files
#[instrument(skip(cancel), level = "debug")]
pub(crate) async fn expand_archive(
    archive_path: PathBuf,
    dest_dir: PathBuf,
    cancel: CancellationToken,
) -> Result<(), ProvisError> {
    task::spawn_blocking(move || expand_blocking(&archive_path, &dest_dir, &cancel)).await?
}

fn expand_blocking(
    archive_path: &Path,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> Result<(), ProvisError> {
    let file = fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut extracted = 0usize;
    for index in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(ProvisError::Cancelled);
        }

        let mut entry = archive.by_index(index)?;
        // Directory placeholders carry no file data
        if entry.name().is_empty() || entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            return Err(ProvisError::IoError(io::Error::other(format!(
                "archive entry escapes destination: {}",
                entry.name()
            ))));
        };

        let out_path = dest_dir.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        extracted += 1;
    }

    debug!(path = ?archive_path, entries = extracted, "Archive expanded");
    Ok(())
}
