//! # Item Cache
//!
//! Filesystem layout and freshness bookkeeping for provisioned items.
//! An item is cached under `<root>/<item-id>/` together with a marker
//! file whose last-write time records when the download completed.

pub mod store;
pub mod types;

pub use store::{ItemCache, MARKER_FILE};
pub use types::CacheStatus;
