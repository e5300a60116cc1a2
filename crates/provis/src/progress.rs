use std::sync::Arc;

/// A struct to hold transfer progress information.
#[derive(Debug, Clone, Copy)]
pub struct TransferProgress {
    /// The number of payload bytes on disk so far.
    pub bytes_transferred: u64,
    /// The total payload size in bytes (if known).
    pub total_bytes: Option<u64>,
}

impl TransferProgress {
    /// Completion as a fraction in `0.0..=1.0`, when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some((self.bytes_transferred as f64 / total as f64).min(1.0))
            }
            _ => None,
        }
    }
}

/// An enum to represent different progress events.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A transfer has started for an item.
    Started {
        /// The id of the item being fetched.
        item_id: String,
        /// The total payload size in bytes (if known).
        total_bytes: Option<u64>,
    },
    /// An update on the progress of an item's transfer.
    Transferred {
        /// The id of the item being fetched.
        item_id: String,
        /// The progress data.
        progress: TransferProgress,
    },
    /// An item's payload is on disk and any archive content is expanded.
    Completed {
        /// The id of the fetched item.
        item_id: String,
    },
}

/// A callback function for progress updates.
pub type OnProgress = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
