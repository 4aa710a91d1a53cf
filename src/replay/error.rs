use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Store error during replay: {0}")]
    Store(#[from] StoreError),

    #[error("Attempt task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ReplayError>;
