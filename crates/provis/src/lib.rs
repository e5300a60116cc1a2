//! # Provis
//!
//! A library for provisioning offline copies of portal items.
//! Given opaque item identifiers, it checks a filesystem cache for a
//! fresh local copy, downloads and expands `.zip` payloads when the
//! copy is missing or stale, and hands callers deterministic local
//! paths once everything is in place.
//!
//! ## Features
//!
//! - Marker-file freshness check against the remote last-modified time
//! - Concurrent batch downloads under one shared cancellation token
//! - Resumable transfers when the remote source supports byte ranges
//! - Pluggable item source trait with an HTTP portal implementation
//! - Per-item progress events for UI integration

pub mod builder;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
mod fetch;
pub mod item;
pub mod portal;
pub mod progress;
pub mod provisioner;
pub mod proxy;

#[cfg(test)]
pub(crate) mod test_utils;

pub use builder::DownloadConfigBuilder;
pub use cache::{CacheStatus, ItemCache, MARKER_FILE};
pub use config::DownloadConfig;
pub use error::ProvisError;

// Re-export the source seam and its HTTP implementation
pub use item::{BoxByteStream, ItemDescriptor, ItemSource, ItemStream};
pub use portal::{CredentialProvider, PortalClient, PortalConfig, StaticCredential};

// Re-export the orchestration surface
pub use progress::{OnProgress, ProgressEvent, TransferProgress};
pub use provisioner::Provisioner;

// Re-export client and proxy utilities
pub use client::create_client;
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
