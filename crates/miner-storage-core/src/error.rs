//! Error taxonomy surfaced by [`MinerStorage`](crate::engine::MinerStorage).
//!
//! Backends report failures as [`anyhow::Error`]; the engine wraps them in
//! [`StorageError::BackingStoreUnavailable`] so callers can tell a client
//! mistake (oversized or malformed batch) from an infrastructure failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The batch alone is larger than the configured capacity. The store is
    /// left untouched and the call must not be retried as-is.
    #[error("content size to store: {requested} bytes exceeds configured max: {capacity} bytes")]
    CapacityExceeded { requested: u64, capacity: u64 },

    /// An entity failed validation at the ingestion boundary. The whole
    /// batch is rejected before any write.
    #[error("malformed entity '{uri}': {reason}")]
    MalformedEntity { uri: String, reason: String },

    /// A label value could not be normalized into a [`DataLabel`](crate::models::DataLabel).
    #[error("invalid data label: {0}")]
    InvalidLabel(String),

    /// An integer did not name a known [`DataSource`](crate::models::DataSource).
    #[error("unknown data source: {0}")]
    UnknownSource(i64),

    /// The persistence layer failed or could not be reached.
    #[error("backing store unavailable: {0:#}")]
    BackingStoreUnavailable(#[source] anyhow::Error),
}

impl StorageError {
    pub fn malformed(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::MalformedEntity {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is the caller's fault (retrying the same input is pointless).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, StorageError::BackingStoreUnavailable(_))
    }
}
