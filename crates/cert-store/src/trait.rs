//! Store traits for mocking
//!
//! The reconciler is written against these traits so unit tests can swap the
//! API server for an in-memory store.

use crate::error::StoreError;
use crds::{Certificate, VirtualServer};

/// Read access to VirtualServer resources
///
/// VirtualServers are owned by the user; the shim never writes them.
#[async_trait::async_trait]
pub trait VirtualServerReader: Send + Sync {
    /// Fetch a VirtualServer, returning `None` when it does not exist
    async fn get_virtual_server(&self, namespace: &str, name: &str) -> Result<Option<VirtualServer>, StoreError>;
}

/// Access to cert-manager Certificate resources
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait CertificateStore: Send + Sync {
    /// Fetch a Certificate, returning `None` when it does not exist
    async fn get_certificate(&self, namespace: &str, name: &str) -> Result<Option<Certificate>, StoreError>;

    /// List Certificates in a namespace, optionally narrowed by a label selector
    async fn list_certificates(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Certificate>, StoreError>;

    /// Create a Certificate. The namespace is taken from the object metadata.
    async fn create_certificate(&self, certificate: &Certificate) -> Result<Certificate, StoreError>;

    /// Replace a Certificate. `metadata.resourceVersion` must match the stored object.
    async fn update_certificate(&self, certificate: &Certificate) -> Result<Certificate, StoreError>;

    /// Delete a Certificate. Deleting a Certificate that is already gone succeeds.
    async fn delete_certificate(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
