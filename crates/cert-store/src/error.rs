//! Store errors

use thiserror::Error;

/// Errors that can occur when reading or writing resources
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API error (transport, auth, server side failures)
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency failure or name collision
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid request (e.g., missing namespace or name)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failure injected by the in-memory store
    #[error("Injected failure: {0}")]
    Injected(String),
}

impl StoreError {
    /// True for errors the API server reported as 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// True for errors the API server reported as 409
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(response) if response.code == 404 => {
                StoreError::NotFound(response.message.clone())
            }
            kube::Error::Api(response) if response.code == 409 => {
                StoreError::Conflict(response.message.clone())
            }
            _ => StoreError::Kube(err),
        }
    }
}
