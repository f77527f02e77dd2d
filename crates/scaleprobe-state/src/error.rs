//! Cluster state errors.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open cluster database: {0}")]
    Open(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Table open, read or write failure inside a transaction.
    #[error("storage error: {0}")]
    Storage(String),

    /// A record could not be encoded or decoded as JSON.
    #[error("malformed record: {0}")]
    Codec(String),

    #[error("cluster lock poisoned")]
    Poisoned,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),
}
