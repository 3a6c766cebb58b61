//! In-memory store for unit testing
//!
//! [`MockStore`] keeps VirtualServers and Certificates in maps keyed by
//! `(namespace, name)`, records every call in an operation log, and can be
//! told to fail specific operations. Updates honour `resourceVersion` the way
//! the API server does, so stale writes surface as [`StoreError::Conflict`].

use crate::error::StoreError;
use crate::selector::matches_selector;
use crate::store_trait::{CertificateStore, VirtualServerReader};
use crds::{Certificate, VirtualServer};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type ObjectMap<K> = BTreeMap<(String, String), K>;

/// Kind of store call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    GetVirtualServer,
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    /// True for calls that mutate Certificates
    pub fn is_write(self) -> bool {
        matches!(self, OperationKind::Create | OperationKind::Update | OperationKind::Delete)
    }
}

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOperation {
    /// Which call was made
    pub kind: OperationKind,
    /// Namespace the call was scoped to
    pub namespace: String,
    /// Object name; `None` for list calls
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
struct Failure {
    message: String,
    /// Remaining failures; `None` fails every call
    remaining: Option<usize>,
}

/// Mock store for testing
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    virtual_servers: Arc<Mutex<ObjectMap<VirtualServer>>>,
    certificates: Arc<Mutex<ObjectMap<Certificate>>>,
    operations: Arc<Mutex<Vec<StoreOperation>>>,
    failures: Arc<Mutex<HashMap<OperationKind, Failure>>>,
    latency: Arc<Mutex<Option<Duration>>>,
    next_id: Arc<Mutex<u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

impl MockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        let mut next = lock(&self.next_id);
        *next += 1;
        *next
    }

    /// Stamp server-populated metadata the way the API server would on write
    fn stamp_resource_version<K: kube::Resource>(&self, obj: &mut K) {
        let id = self.next_id();
        obj.meta_mut().resource_version = Some(id.to_string());
    }

    async fn begin(&self, kind: OperationKind, namespace: &str, name: Option<&str>) -> Result<(), StoreError> {
        lock(&self.operations).push(StoreOperation {
            kind,
            namespace: namespace.to_string(),
            name: name.map(str::to_string),
        });

        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut failures = lock(&self.failures);
        let Some(failure) = failures.get_mut(&kind) else {
            return Ok(());
        };
        let message = failure.message.clone();
        let exhausted = match failure.remaining.as_mut() {
            Some(0) => return Ok(()),
            Some(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            failures.remove(&kind);
        }
        Err(StoreError::Injected(message))
    }

    /// Seed a VirtualServer. A missing uid is generated.
    pub fn insert_virtual_server(&self, mut vs: VirtualServer) -> VirtualServer {
        if vs.metadata.uid.is_none() {
            vs.metadata.uid = Some(format!("vs-uid-{}", self.next_id()));
        }
        self.stamp_resource_version(&mut vs);
        let namespace = vs.metadata.namespace.clone().unwrap_or_default();
        let name = vs.metadata.name.clone().unwrap_or_default();
        lock(&self.virtual_servers).insert(key(&namespace, &name), vs.clone());
        vs
    }

    /// Remove a VirtualServer, returning it if present
    pub fn remove_virtual_server(&self, namespace: &str, name: &str) -> Option<VirtualServer> {
        lock(&self.virtual_servers).remove(&key(namespace, name))
    }

    /// Seed a Certificate without recording an operation. A missing uid is generated.
    pub fn insert_certificate(&self, mut certificate: Certificate) -> Certificate {
        if certificate.metadata.uid.is_none() {
            certificate.metadata.uid = Some(format!("cert-uid-{}", self.next_id()));
        }
        self.stamp_resource_version(&mut certificate);
        let namespace = certificate.metadata.namespace.clone().unwrap_or_default();
        let name = certificate.metadata.name.clone().unwrap_or_default();
        lock(&self.certificates).insert(key(&namespace, &name), certificate.clone());
        certificate
    }

    /// Stored Certificate by name
    pub fn certificate(&self, namespace: &str, name: &str) -> Option<Certificate> {
        lock(&self.certificates).get(&key(namespace, name)).cloned()
    }

    /// Stored Certificates in a namespace, ordered by name
    pub fn certificates(&self, namespace: &str) -> Vec<Certificate> {
        lock(&self.certificates)
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, certificate)| certificate.clone())
            .collect()
    }

    /// Every recorded call, oldest first
    pub fn operations(&self) -> Vec<StoreOperation> {
        lock(&self.operations).clone()
    }

    /// Recorded Certificate writes, oldest first
    pub fn writes(&self) -> Vec<StoreOperation> {
        lock(&self.operations)
            .iter()
            .filter(|op| op.kind.is_write())
            .cloned()
            .collect()
    }

    /// Forget every recorded call
    pub fn clear_operations(&self) {
        lock(&self.operations).clear();
    }

    /// Fail the next `times` calls of `kind`
    pub fn fail_next(&self, kind: OperationKind, times: usize, message: impl Into<String>) {
        lock(&self.failures).insert(
            kind,
            Failure {
                message: message.into(),
                remaining: Some(times),
            },
        );
    }

    /// Fail every call of `kind` until [`MockStore::clear_failures`]
    pub fn fail_always(&self, kind: OperationKind, message: impl Into<String>) {
        lock(&self.failures).insert(
            kind,
            Failure {
                message: message.into(),
                remaining: None,
            },
        );
    }

    /// Stop failing calls
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }
}

#[async_trait::async_trait]
impl VirtualServerReader for MockStore {
    async fn get_virtual_server(&self, namespace: &str, name: &str) -> Result<Option<VirtualServer>, StoreError> {
        self.begin(OperationKind::GetVirtualServer, namespace, Some(name)).await?;
        Ok(lock(&self.virtual_servers).get(&key(namespace, name)).cloned())
    }
}

#[async_trait::async_trait]
impl CertificateStore for MockStore {
    async fn get_certificate(&self, namespace: &str, name: &str) -> Result<Option<Certificate>, StoreError> {
        self.begin(OperationKind::Get, namespace, Some(name)).await?;
        Ok(self.certificate(namespace, name))
    }

    async fn list_certificates(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Certificate>, StoreError> {
        self.begin(OperationKind::List, namespace, None).await?;
        let mut listed = Vec::new();
        for certificate in self.certificates(namespace) {
            let selected = match label_selector {
                Some(selector) => matches_selector(certificate.metadata.labels.as_ref(), selector)?,
                None => true,
            };
            if selected {
                listed.push(certificate);
            }
        }
        Ok(listed)
    }

    async fn create_certificate(&self, certificate: &Certificate) -> Result<Certificate, StoreError> {
        let namespace = certificate
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| StoreError::InvalidRequest("Certificate has no namespace".to_string()))?;
        let name = certificate
            .metadata
            .name
            .clone()
            .ok_or_else(|| StoreError::InvalidRequest("Certificate has no name".to_string()))?;
        self.begin(OperationKind::Create, &namespace, Some(&name)).await?;

        if self.certificate(&namespace, &name).is_some() {
            return Err(StoreError::Conflict(format!(
                "certificates.cert-manager.io {name:?} already exists"
            )));
        }

        let mut created = certificate.clone();
        created.metadata.uid = Some(format!("cert-uid-{}", self.next_id()));
        self.stamp_resource_version(&mut created);
        lock(&self.certificates).insert(key(&namespace, &name), created.clone());
        Ok(created)
    }

    async fn update_certificate(&self, certificate: &Certificate) -> Result<Certificate, StoreError> {
        let namespace = certificate.metadata.namespace.clone().unwrap_or_default();
        let name = certificate
            .metadata
            .name
            .clone()
            .ok_or_else(|| StoreError::InvalidRequest("Certificate has no name".to_string()))?;
        self.begin(OperationKind::Update, &namespace, Some(&name)).await?;

        let stored = self
            .certificate(&namespace, &name)
            .ok_or_else(|| StoreError::NotFound(format!("certificates.cert-manager.io {name:?} not found")))?;

        if let Some(requested) = certificate.metadata.resource_version.as_deref() {
            if stored.metadata.resource_version.as_deref() != Some(requested) {
                return Err(StoreError::Conflict(format!(
                    "Operation cannot be fulfilled on certificates.cert-manager.io {name:?}: \
                     the object has been modified; please apply your changes to the latest version and try again"
                )));
            }
        }

        let mut updated = certificate.clone();
        updated.metadata.uid = stored.metadata.uid;
        self.stamp_resource_version(&mut updated);
        lock(&self.certificates).insert(key(&namespace, &name), updated.clone());
        Ok(updated)
    }

    async fn delete_certificate(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.begin(OperationKind::Delete, namespace, Some(name)).await?;
        lock(&self.certificates).remove(&key(namespace, name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::CertificateSpec;

    fn certificate(namespace: &str, name: &str) -> Certificate {
        let mut certificate = Certificate::new(name, CertificateSpec::default());
        certificate.metadata.namespace = Some(namespace.to_string());
        certificate
    }

    #[tokio::test]
    async fn test_create_assigns_uid_and_rejects_duplicates() {
        let store = MockStore::new();
        let created = store.create_certificate(&certificate("default", "a")).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.resource_version.is_some());

        let err = store.create_certificate(&certificate("default", "a")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_with_stale_resource_version_conflicts() {
        let store = MockStore::new();
        let created = store.create_certificate(&certificate("default", "a")).await.unwrap();

        let mut first = created.clone();
        first.spec.secret_name = "first".to_string();
        store.update_certificate(&first).await.unwrap();

        let mut stale = created;
        stale.spec.secret_name = "second".to_string();
        let err = store.update_certificate(&stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.certificate("default", "a").unwrap().spec.secret_name, "first");
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MockStore::new();
        let err = store.update_certificate(&certificate("default", "a")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_labels() {
        let store = MockStore::new();
        let mut labelled = certificate("default", "a");
        labelled.metadata.labels = Some(BTreeMap::from([("app".to_string(), "web".to_string())]));
        store.insert_certificate(labelled);
        store.insert_certificate(certificate("default", "b"));
        store.insert_certificate(certificate("other", "c"));

        assert_eq!(store.list_certificates("default", None).await.unwrap().len(), 2);
        let selected = store.list_certificates("default", Some("app=web")).await.unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].metadata.name.as_deref(), Some("a"));

        let err = store.list_certificates("default", Some("app in (web)")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed() {
        let store = MockStore::new();
        store.fail_next(OperationKind::List, 1, "boom");

        let err = store.list_certificates("default", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Injected(ref message) if message == "boom"));
        assert!(store.list_certificates("default", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_writes_only_records_mutations() {
        let store = MockStore::new();
        store.list_certificates("default", None).await.unwrap();
        store.create_certificate(&certificate("default", "a")).await.unwrap();
        store.delete_certificate("default", "a").await.unwrap();
        store.delete_certificate("default", "a").await.unwrap();

        let kinds: Vec<_> = store.writes().into_iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::Create, OperationKind::Delete, OperationKind::Delete]
        );
        assert_eq!(store.operations().len(), 4);
    }
}
