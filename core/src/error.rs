//! Error type shared by the store, the reconciler and the service layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    /// The database rejected a read or write, or the handle could not be opened.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Caller-supplied data failed a shape or field check.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The transfer payload is not well-formed JSON.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<rusqlite::Error> for JournalError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for JournalError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(format!("database task failed: {err}"))
    }
}

impl JournalError {
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
