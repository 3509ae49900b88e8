//! Error type shared by the core stores.

use thiserror::Error;

/// Errors raised by local persistence and (de)serialization.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A store backend failed to read or write a record.
    #[error("store error: {0}")]
    Store(String),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
