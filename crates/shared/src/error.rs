//! Error types for Huddle

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HuddleError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for HuddleError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => HuddleError::NotFound("row".to_string()),
            other => HuddleError::Storage(other.to_string()),
        }
    }
}

pub type HuddleResult<T> = Result<T, HuddleError>;
