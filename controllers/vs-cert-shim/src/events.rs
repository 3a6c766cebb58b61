//! Kubernetes Event recording.
//!
//! Reconcile outcomes are reported as Events on the VirtualServer, visible
//! via `kubectl describe virtualserver`. Events are fire-and-forget: a failed
//! publish is logged and never fails the reconcile pass.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

/// Controller name reported on Events
pub const REPORTING_CONTROLLER: &str = "vs-cert-shim";

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Publish an Event on `subject`. Never fails.
    async fn publish(
        &self,
        subject: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production recorder wrapping `kube_runtime::events::Recorder`.
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// Recorder publishing as `vs-cert-shim`, instance taken from `POD_NAME`
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: REPORTING_CONTROLLER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn publish(
        &self,
        subject: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, subject).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`.
pub mod reasons {
    /// Issuer overrides or cert-manager fields are invalid
    pub const BAD_CONFIG: &str = "BadConfig";
    /// A Certificate was created
    pub const CREATE_CERTIFICATE: &str = "CreateCertificate";
    /// A Certificate was updated
    pub const UPDATE_CERTIFICATE: &str = "UpdateCertificate";
    /// An unrequired Certificate was deleted
    pub const DELETE_CERTIFICATE: &str = "DeleteCertificate";
    /// A Certificate with the requested name is controlled by someone else
    pub const FOREIGNLY_OWNED: &str = "ForeignlyOwned";
}

/// Event actions, shown in the ACTION column.
pub mod actions {
    /// Checking a VirtualServer against its Certificates
    pub const RECONCILE: &str = "Reconcile";
    /// Creating a Certificate
    pub const CREATE: &str = "Create";
    /// Updating a Certificate
    pub const UPDATE: &str = "Update";
    /// Deleting a Certificate
    pub const DELETE: &str = "Delete";
}

#[cfg(test)]
pub use recording::{RecordedEvent, RecordingEventRecorder};
