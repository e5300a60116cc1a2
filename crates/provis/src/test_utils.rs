//! Shared fixtures for engine tests: a scripted in-memory item source
//! and zip payload builders.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use futures::stream;

use crate::{
    error::ProvisError,
    item::{ItemDescriptor, ItemSource, ItemStream},
};

/// Macro to initialize tracing for tests
///
/// Usage:
/// - `init_test_tracing!()` - uses DEBUG level (default)
/// - `init_test_tracing!(INFO)` - uses specified level
#[macro_export]
macro_rules! init_test_tracing {
    () => {
        init_test_tracing!(DEBUG);
    };
    ($level:ident) => {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::$level)
            .with_test_writer()
            .try_init();
    };
}

/// How a mock item's payload behaves when opened
pub(crate) enum MockPayload {
    /// Yield the bytes, then end the stream
    Bytes(Vec<u8>),
    /// Yield the bytes, then fail the stream
    FailAfter(Vec<u8>),
    /// Yield the bytes, then stay pending until the caller cancels
    Stall(Vec<u8>),
    /// Sleep briefly, then yield the bytes and end the stream
    Delayed(Vec<u8>),
}

struct MockItem {
    name: String,
    modified: DateTime<Utc>,
    payload: MockPayload,
}

/// Scripted item source with call counters
#[derive(Default)]
pub(crate) struct MockSource {
    items: Mutex<HashMap<String, MockItem>>,
    resolve_calls: AtomicUsize,
    open_calls: AtomicUsize,
    resumable: AtomicBool,
    resume_offsets: Mutex<Vec<u64>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a source holding one item modified an hour ago
    pub fn with_item(item_id: &str, name: &str, payload: MockPayload) -> Self {
        let source = Self::new();
        source.insert(item_id, name, Utc::now() - Duration::hours(1), payload);
        source
    }

    pub fn insert(&self, item_id: &str, name: &str, modified: DateTime<Utc>, payload: MockPayload) {
        self.items.lock().unwrap().insert(
            item_id.to_string(),
            MockItem {
                name: name.to_string(),
                modified,
                payload,
            },
        );
    }

    pub fn remove(&self, item_id: &str) {
        self.items.lock().unwrap().remove(item_id);
    }

    pub fn set_modified(&self, item_id: &str, modified: DateTime<Utc>) {
        if let Some(item) = self.items.lock().unwrap().get_mut(item_id) {
            item.modified = modified;
        }
    }

    /// Honor ranged opens against the current payload, the way an HTTP
    /// source does after a `206 Partial Content`
    pub fn set_resumable(&self, resumable: bool) {
        self.resumable.store(resumable, Ordering::SeqCst);
    }

    pub fn resolve_count(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Offsets of the ranged opens that were actually honored
    pub fn resume_offsets(&self) -> Vec<u64> {
        self.resume_offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemSource for MockSource {
    async fn resolve(&self, item_id: &str) -> Result<ItemDescriptor, ProvisError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let items = self.items.lock().unwrap();
        let item = items
            .get(item_id)
            .ok_or_else(|| ProvisError::ItemNotFound(item_id.to_string()))?;
        Ok(ItemDescriptor {
            id: item_id.to_string(),
            name: item.name.clone(),
            modified: item.modified,
            size: None,
        })
    }

    async fn open(&self, item: &ItemDescriptor) -> Result<ItemStream, ProvisError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let items = self.items.lock().unwrap();
        let mock = items
            .get(&item.id)
            .ok_or_else(|| ProvisError::ItemNotFound(item.id.clone()))?;

        let (stream, total_bytes) = match &mock.payload {
            MockPayload::Bytes(data) => (
                stream::iter(vec![Ok(Bytes::from(data.clone()))]).boxed(),
                Some(data.len() as u64),
            ),
            MockPayload::FailAfter(data) => (
                stream::iter(vec![
                    Ok(Bytes::from(data.clone())),
                    Err(ProvisError::IoError(std::io::Error::other(
                        "stream interrupted",
                    ))),
                ])
                .boxed(),
                None,
            ),
            MockPayload::Stall(data) => (
                stream::iter(vec![Ok(Bytes::from(data.clone()))])
                    .chain(stream::pending())
                    .boxed(),
                None,
            ),
            MockPayload::Delayed(data) => {
                let data = data.clone();
                (
                    stream::once(async move {
                        tokio::time::sleep(StdDuration::from_millis(100)).await;
                        Ok(Bytes::from(data))
                    })
                    .boxed(),
                    None,
                )
            }
        };

        Ok(ItemStream {
            stream,
            total_bytes,
            offset: 0,
        })
    }

    async fn open_from(
        &self,
        item: &ItemDescriptor,
        offset: u64,
    ) -> Result<ItemStream, ProvisError> {
        let ranged = if self.resumable.load(Ordering::SeqCst) {
            let items = self.items.lock().unwrap();
            let mock = items
                .get(&item.id)
                .ok_or_else(|| ProvisError::ItemNotFound(item.id.clone()))?;
            match &mock.payload {
                // Serve the current entity from the requested offset
                MockPayload::Bytes(data) if offset <= data.len() as u64 => Some(data.clone()),
                _ => None,
            }
        } else {
            None
        };

        let Some(data) = ranged else {
            return self.open(item).await;
        };

        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.resume_offsets.lock().unwrap().push(offset);
        let body = data[offset as usize..].to_vec();
        Ok(ItemStream {
            stream: stream::iter(vec![Ok(Bytes::from(body))]).boxed(),
            total_bytes: Some(data.len() as u64),
            offset,
        })
    }
}

/// Build an in-memory zip archive from `(name, content)` pairs
pub(crate) fn zip_payload(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}
