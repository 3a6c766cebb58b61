//! Kubernetes backed store

use crate::error::StoreError;
use crate::store_trait::{CertificateStore, VirtualServerReader};
use crds::{Certificate, VirtualServer};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

/// Store that reads and writes through the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    /// Create a store issuing every call against `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn certificates(&self, namespace: &str) -> Api<Certificate> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn scoped_certificates(&self, certificate: &Certificate) -> Result<(Api<Certificate>, String), StoreError> {
        let namespace = certificate
            .namespace()
            .ok_or_else(|| StoreError::InvalidRequest("Certificate has no namespace".to_string()))?;
        let name = certificate
            .metadata
            .name
            .clone()
            .ok_or_else(|| StoreError::InvalidRequest("Certificate has no name".to_string()))?;
        Ok((self.certificates(&namespace), name))
    }
}

#[async_trait::async_trait]
impl VirtualServerReader for KubeStore {
    async fn get_virtual_server(&self, namespace: &str, name: &str) -> Result<Option<VirtualServer>, StoreError> {
        let api: Api<VirtualServer> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

#[async_trait::async_trait]
impl CertificateStore for KubeStore {
    async fn get_certificate(&self, namespace: &str, name: &str) -> Result<Option<Certificate>, StoreError> {
        Ok(self.certificates(namespace).get_opt(name).await?)
    }

    async fn list_certificates(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Certificate>, StoreError> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = self.certificates(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create_certificate(&self, certificate: &Certificate) -> Result<Certificate, StoreError> {
        let (api, name) = self.scoped_certificates(certificate)?;
        debug!("Creating Certificate {}", name);
        Ok(api.create(&PostParams::default(), certificate).await?)
    }

    async fn update_certificate(&self, certificate: &Certificate) -> Result<Certificate, StoreError> {
        let (api, name) = self.scoped_certificates(certificate)?;
        debug!("Replacing Certificate {}", name);
        Ok(api.replace(&name, &PostParams::default(), certificate).await?)
    }

    async fn delete_certificate(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        debug!("Deleting Certificate {}/{}", namespace, name);
        match self.certificates(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = StoreError::from(err);
                if err.is_not_found() {
                    debug!("Certificate {}/{} already deleted", namespace, name);
                    return Ok(());
                }
                Err(err)
            }
        }
    }
}
