//! # Fetch Pipeline
//!
//! The per-item download pipeline: stream the payload to disk, expand
//! archive payloads, then stamp the cache marker. Every stage observes
//! the shared cancellation token.

pub(crate) mod job;
pub(crate) mod transfer;
pub(crate) mod unpack;
