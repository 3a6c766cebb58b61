//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::events::RecordingEventRecorder;
#[cfg(test)]
use crate::reconciler::{IssuerDefaults, OwnershipPolicy, Reconciler};
#[cfg(test)]
use cert_store::MockStore;
#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::Arc;

/// Helper to create a test VirtualServer with a uid
#[cfg(test)]
pub fn create_test_virtual_server(
    namespace: &str,
    name: &str,
    host: &str,
    secret: Option<&str>,
    cert_manager: Option<CertManagerConfig>,
) -> VirtualServer {
    VirtualServer {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{namespace}-{name}-uid")),
            ..Default::default()
        },
        spec: VirtualServerSpec {
            host: host.to_string(),
            tls: secret.map(|secret| VirtualServerTls {
                secret: secret.to_string(),
                cert_manager,
            }),
        },
    }
}

/// Helper to create a test VirtualServer with labels
#[cfg(test)]
pub fn with_labels(mut vs: VirtualServer, labels: &[(&str, &str)]) -> VirtualServer {
    vs.metadata.labels = Some(
        labels
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect::<BTreeMap<_, _>>(),
    );
    vs
}

/// Helper to create a Certificate with no owner
#[cfg(test)]
pub fn create_test_certificate(namespace: &str, name: &str, secret: &str) -> Certificate {
    Certificate {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: CertificateSpec {
            secret_name: secret.to_string(),
            issuer_ref: IssuerReference::new("old-issuer", ISSUER_KIND, ""),
            ..Default::default()
        },
    }
}

/// Helper to create a Certificate controlled by `owner`
#[cfg(test)]
pub fn create_owned_certificate(owner: &VirtualServer, name: &str, secret: &str) -> Certificate {
    let namespace = owner.metadata.namespace.as_deref().unwrap_or_default();
    let mut crt = create_test_certificate(namespace, name, secret);
    crt.metadata.owner_references = Some(vec![controller_reference(owner).unwrap()]);
    crt
}

/// Issuer defaults of a ClusterIssuer named `letsencrypt`
#[cfg(test)]
pub fn letsencrypt_defaults() -> IssuerDefaults {
    IssuerDefaults {
        name: "letsencrypt".to_string(),
        kind: CLUSTER_ISSUER_KIND.to_string(),
        group: String::new(),
    }
}

/// Reconciler wired to an in-memory store and a recording event sink
#[cfg(test)]
pub struct TestHarness {
    /// Backing store for both VirtualServers and Certificates
    pub store: MockStore,
    /// Every event the reconciler published
    pub events: Arc<RecordingEventRecorder>,
    /// Reconciler under test
    pub reconciler: Arc<Reconciler>,
}

/// Helper to wire a reconciler to fresh test doubles
#[cfg(test)]
pub fn create_test_harness(defaults: IssuerDefaults, policy: OwnershipPolicy) -> TestHarness {
    let store = MockStore::new();
    let events = Arc::new(RecordingEventRecorder::default());
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        events.clone(),
        defaults,
        policy,
    ));
    TestHarness {
        store,
        events,
        reconciler,
    }
}
