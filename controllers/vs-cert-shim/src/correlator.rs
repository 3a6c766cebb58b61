//! Change correlation.
//!
//! Turns watch notifications into VirtualServer keys on the work queue.
//! VirtualServer changes enqueue the VirtualServer itself; Certificate
//! changes enqueue the VirtualServer that controls the Certificate, so a
//! Certificate that is edited or deleted by hand gets reconciled back.

use crate::key::ObjectKey;
use crate::queue::WorkQueue;
use crds::{Certificate, VirtualServer, controller_of};
use kube::ResourceExt;
use tracing::{debug, trace};

/// Receives add/update/delete notifications for one resource kind
pub trait ResourceEventHandler<K>: Send + Sync {
    /// `obj` appeared, either from a watch event or a relist
    fn on_add(&self, obj: &K);
    /// `old` is the last state delivered to this handler
    fn on_update(&self, old: &K, new: &K);
    /// `obj` is gone; its last known state when available
    fn on_delete(&self, obj: &K);
}

/// True when an update changes anything that ends up in the Certificate:
/// the host, the `tls` block (secret name and cert-manager settings) or the
/// labels.
fn affects_certificates(old: &VirtualServer, new: &VirtualServer) -> bool {
    old.spec != new.spec || old.labels() != new.labels()
}

/// Enqueues VirtualServers on add, delete, and changes to their TLS settings
#[derive(Debug, Clone)]
pub struct VirtualServerHandler {
    queue: WorkQueue<ObjectKey>,
}

impl VirtualServerHandler {
    /// Handler adding VirtualServer keys to `queue`
    pub fn new(queue: WorkQueue<ObjectKey>) -> Self {
        Self { queue }
    }

    fn enqueue(&self, vs: &VirtualServer) {
        match ObjectKey::from_resource(vs) {
            Some(key) => {
                trace!(%key, "Enqueue VirtualServer");
                self.queue.add(key);
            }
            None => debug!("Ignoring VirtualServer without namespace or name"),
        }
    }
}

impl ResourceEventHandler<VirtualServer> for VirtualServerHandler {
    fn on_add(&self, vs: &VirtualServer) {
        self.enqueue(vs);
    }

    fn on_update(&self, old: &VirtualServer, new: &VirtualServer) {
        if affects_certificates(old, new) {
            self.enqueue(new);
        } else {
            trace!(name = %new.name_any(), "VirtualServer update does not touch TLS settings");
        }
    }

    fn on_delete(&self, vs: &VirtualServer) {
        self.enqueue(vs);
    }
}

/// Enqueues the controlling VirtualServer of a changed Certificate
#[derive(Debug, Clone)]
pub struct CertificateHandler {
    queue: WorkQueue<ObjectKey>,
}

impl CertificateHandler {
    /// Handler adding the keys of controlling VirtualServers to `queue`
    pub fn new(queue: WorkQueue<ObjectKey>) -> Self {
        Self { queue }
    }

    fn enqueue_owner(&self, crt: &Certificate) {
        // Orphans are nobody's business
        let Some(owner) = controller_of(crt) else {
            return;
        };
        // Owner references carry no namespace; they only work within one
        if owner.kind != "VirtualServer" {
            return;
        }
        let Some(namespace) = crt.namespace() else {
            return;
        };
        let key = ObjectKey::new(namespace, owner.name.clone());
        trace!(%key, certificate = %crt.name_any(), "Enqueue controller of Certificate");
        self.queue.add(key);
    }
}

impl ResourceEventHandler<Certificate> for CertificateHandler {
    fn on_add(&self, crt: &Certificate) {
        self.enqueue_owner(crt);
    }

    fn on_update(&self, _old: &Certificate, new: &Certificate) {
        self.enqueue_owner(new);
    }

    fn on_delete(&self, crt: &Certificate) {
        self.enqueue_owner(crt);
    }
}
