//! Object store errors

use thiserror::Error;

/// Errors that can occur when reading or writing cluster objects
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write lost an optimistic-concurrency race (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// API server unreachable, throttled or otherwise failing
    #[error("Transient store error: {0}")]
    Transient(String),

    /// Object handed to the store is missing its identity
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Object could not be encoded for the request
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether this error means the object is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Classify a kube client error for the object identified by `key`
    pub fn from_kube(key: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(status) if status.code == 404 => StoreError::NotFound(key.to_string()),
            kube::Error::Api(status) if status.code == 409 => {
                StoreError::Conflict(format!("{}: {}", key, status.message))
            }
            other => StoreError::Transient(format!("{}: {}", key, other)),
        }
    }
}
