use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Entry already exists: {0}")]
    DuplicateEntry(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Invalid entry id: {0}")]
    InvalidId(String),

    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Corrupted entry: {0}")]
    Corrupted(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store integrity violated: {0}")]
    Integrity(String),
}

impl StoreError {
    /// True for failures of the underlying medium (full, corrupted, unavailable)
    pub fn is_persistence(&self) -> bool {
        !matches!(
            self,
            StoreError::DuplicateEntry(_) | StoreError::EntryNotFound(_) | StoreError::InvalidId(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
