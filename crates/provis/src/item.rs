//! # Item Source Trait
//!
//! This module defines the seam between the provisioning engine and a
//! remote item store. Production code talks to a portal over HTTP; tests
//! substitute scripted sources.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ProvisError;

/// A type alias for a boxed payload byte stream
pub type BoxByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProvisError>> + Send>>;

/// Resolved metadata for a single remote item
#[derive(Debug, Clone)]
pub struct ItemDescriptor {
    /// Opaque item identifier
    pub id: String,
    /// Human-readable payload file name
    pub name: String,
    /// Remote last-modified timestamp
    pub modified: DateTime<Utc>,
    /// Payload size in bytes (if the remote store reports one)
    pub size: Option<u64>,
}

/// An open payload stream plus transfer bookkeeping
pub struct ItemStream {
    /// The payload bytes
    pub stream: BoxByteStream,
    /// Total payload size in bytes (if known)
    pub total_bytes: Option<u64>,
    /// Byte offset in the payload where this stream starts
    pub offset: u64,
}

/// A remote store of downloadable items
#[async_trait]
pub trait ItemSource: Send + Sync + 'static {
    /// Resolve an item id into its descriptor
    async fn resolve(&self, item_id: &str) -> Result<ItemDescriptor, ProvisError>;

    /// Open the item's payload as a byte stream from offset zero
    async fn open(&self, item: &ItemDescriptor) -> Result<ItemStream, ProvisError>;

    /// Open the item's payload from a byte offset.
    ///
    /// The offset is a hint for sources that support ranged reads; the
    /// default implementation falls back to a full fetch. Callers must
    /// honor the `offset` field of the returned stream rather than the
    /// offset they asked for.
    async fn open_from(
        &self,
        item: &ItemDescriptor,
        offset: u64,
    ) -> Result<ItemStream, ProvisError> {
        let _ = offset;
        self.open(item).await
    }
}

/// Reduce a remote-supplied file name to a single safe path component.
///
/// Names arrive from the remote store verbatim; any directory part is
/// stripped and degenerate names get a neutral fallback.
pub fn sanitize_file_name(name: &str) -> &str {
    let base = name
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or("");
    match base {
        "" | "." | ".." => "item.data",
        other => other,
    }
}

/// Validate an item id before it is used as a directory name.
///
/// Ids are opaque but become path components, so anything that could
/// escape the cache root is rejected.
pub fn validate_item_id(item_id: &str) -> Result<(), ProvisError> {
    if item_id.is_empty() {
        return Err(ProvisError::InvalidItemId("empty id".to_string()));
    }
    if item_id.contains(['/', '\\']) || item_id == "." || item_id == ".." {
        return Err(ProvisError::InvalidItemId(item_id.to_string()));
    }
    Ok(())
}
