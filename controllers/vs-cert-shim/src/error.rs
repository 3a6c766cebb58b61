//! Controller-specific error types.
//!
//! This module defines error types for the VirtualServer certificate shim
//! that are not covered by upstream library errors.

use cert_store::StoreError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the certificate shim.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Certificate or VirtualServer store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// The issuer overrides on a VirtualServer cannot be resolved
    #[error("{}", violations.join(", "))]
    BadConfig { violations: Vec<String> },

    /// A `cert-manager` field could not be parsed
    #[error("invalid cert-manager annotation {key:?}: {reason}")]
    InvalidAnnotation { key: String, reason: String },

    /// The VirtualServer lacks metadata needed to derive a Certificate
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// A queue key is not of the form `namespace/name`
    #[error("Invalid resource key: {0}")]
    InvalidKey(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics/health server failed
    #[error("HTTP server error: {0}")]
    Server(String),

    /// The reconcile pass was cancelled before it finished
    #[error("Reconciliation cancelled")]
    Cancelled,
}

impl ControllerError {
    /// Whether the failed key should be requeued with backoff.
    ///
    /// Configuration problems on the resource itself are not retried; the next
    /// change to the resource triggers a new pass.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ControllerError::InvalidAnnotation { .. }
                | ControllerError::InvalidKey(_)
                | ControllerError::BadConfig { .. }
                | ControllerError::InvalidResource(_)
        )
    }

    /// True when a write lost against a newer version of the object, usually
    /// because it was based on a cached copy that had not caught up yet.
    pub fn is_stale_write(&self) -> bool {
        matches!(self, ControllerError::Store(err) if err.is_conflict())
    }
}
