use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provisioning error: {0}")]
    Provision(#[from] provis_engine::ProvisError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}

impl AppError {
    /// True when the underlying provisioning run was cancelled rather
    /// than failed
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Provision(e) if e.is_cancelled())
    }
}
