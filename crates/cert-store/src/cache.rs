//! Reflector backed store
//!
//! [`CachedStore`] answers reads from the `kube-runtime` reflector stores the
//! watchers keep up to date and hands writes to another store, normally a
//! [`KubeStore`](crate::KubeStore). Reads may lag behind the cluster; a write
//! based on a stale copy fails with [`StoreError::Conflict`] and is retried
//! by the caller.

use crate::error::StoreError;
use crate::selector::matches_selector;
use crate::store_trait::{CertificateStore, VirtualServerReader};
use crds::{Certificate, VirtualServer};
use kube::ResourceExt;
use kube::runtime::reflector::{ObjectRef, Store};

/// Store reading from watch caches and writing through another store
#[derive(Debug, Clone)]
pub struct CachedStore<W> {
    writer: W,
    virtual_servers: Store<VirtualServer>,
    certificates: Store<Certificate>,
}

impl<W> CachedStore<W> {
    /// Combine the watch caches with the store used for writes
    pub fn new(writer: W, virtual_servers: Store<VirtualServer>, certificates: Store<Certificate>) -> Self {
        Self {
            writer,
            virtual_servers,
            certificates,
        }
    }
}

#[async_trait::async_trait]
impl<W: Send + Sync> VirtualServerReader for CachedStore<W> {
    async fn get_virtual_server(&self, namespace: &str, name: &str) -> Result<Option<VirtualServer>, StoreError> {
        let key = ObjectRef::new(name).within(namespace);
        Ok(self.virtual_servers.get(&key).map(|vs| (*vs).clone()))
    }
}

#[async_trait::async_trait]
impl<W: CertificateStore> CertificateStore for CachedStore<W> {
    async fn get_certificate(&self, namespace: &str, name: &str) -> Result<Option<Certificate>, StoreError> {
        let key = ObjectRef::new(name).within(namespace);
        Ok(self.certificates.get(&key).map(|crt| (*crt).clone()))
    }

    async fn list_certificates(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Certificate>, StoreError> {
        let mut listed = Vec::new();
        for certificate in self.certificates.state() {
            if certificate.namespace().as_deref() != Some(namespace) {
                continue;
            }
            if let Some(selector) = label_selector {
                if !matches_selector(certificate.metadata.labels.as_ref(), selector)? {
                    continue;
                }
            }
            listed.push((*certificate).clone());
        }
        listed.sort_by_key(ResourceExt::name_any);
        Ok(listed)
    }

    async fn create_certificate(&self, certificate: &Certificate) -> Result<Certificate, StoreError> {
        self.writer.create_certificate(certificate).await
    }

    async fn update_certificate(&self, certificate: &Certificate) -> Result<Certificate, StoreError> {
        self.writer.update_certificate(certificate).await
    }

    async fn delete_certificate(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.writer.delete_certificate(namespace, name).await
    }
}
