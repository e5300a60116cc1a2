/// Freshness of a locally cached item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// The marker exists and is at least as new as the remote item
    Fresh,
    /// The marker exists but the remote item changed after it was written
    Stale,
    /// No marker exists
    Absent,
}

impl CacheStatus {
    /// True when no download is required
    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheStatus::Fresh)
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CacheStatus::Fresh => "fresh",
            CacheStatus::Stale => "stale",
            CacheStatus::Absent => "absent",
        };
        f.write_str(label)
    }
}
