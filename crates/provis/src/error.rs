use reqwest::StatusCode;

// Custom error type for provisioning operations
#[derive(Debug, thiserror::Error)]
pub enum ProvisError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(String),

    #[error("Server returned status code {0}")]
    StatusCode(StatusCode),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid proxy configuration: {0}")]
    ProxyError(String),

    #[error("Invalid item id: {0}")]
    InvalidItemId(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Malformed item metadata: {0}")]
    MetadataError(String),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    #[error("Background task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ProvisError {
    /// True when the operation ended because the shared cancellation
    /// signal fired, as opposed to failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProvisError::Cancelled)
    }
}
