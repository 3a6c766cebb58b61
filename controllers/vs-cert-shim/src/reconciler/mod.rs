//! Reconciliation of VirtualServers into cert-manager Certificates.
//!
//! This module is organized by pipeline stage:
//! - `annotations`: cert-manager block to `cert-manager.io/*` keys to Certificate fields
//! - `duration`: Go duration strings
//! - `issuer`: issuer defaults and per-resource overrides
//! - `certificates`: desired Certificate and the create/update plan
//! - `cleanup`: owned Certificates that are no longer required
//!
//! [`Reconciler::sync`] runs them in order for one VirtualServer:
//! resolve issuer, build, create, update, list, collect, delete.

/// cert-manager block translation
pub mod annotations;
#[cfg(test)]
mod annotations_test;
pub mod certificates;
#[cfg(test)]
mod certificates_test;
pub mod cleanup;
pub mod duration;
pub mod issuer;

pub use certificates::{CertificatePlan, OwnershipPolicy, build_certificate, certificate_needs_update, plan_certificates};
pub use cleanup::{find_certificates_to_remove, required_secret_names};
pub use issuer::{IssuerDefaults, resolve_issuer};

use crate::error::ControllerError;
use crate::events::{EventRecorder, actions, reasons};
use crate::key::ObjectKey;
use crate::metrics::Metrics;
use annotations::to_annotations;
use cert_store::{CertificateStore, StoreError, VirtualServerReader};
use crds::VirtualServer;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{Resource, ResourceExt};
use kube_runtime::events::EventType;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Runs `call` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, ControllerError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ControllerError::Cancelled),
        result = call => result.map_err(ControllerError::from),
    }
}

/// Reconciles VirtualServers into Certificates.
pub struct Reconciler {
    virtual_servers: Arc<dyn VirtualServerReader>,
    certificates: Arc<dyn CertificateStore>,
    events: Arc<dyn EventRecorder>,
    defaults: IssuerDefaults,
    policy: OwnershipPolicy,
    metrics: Option<Arc<Metrics>>,
}

impl Reconciler {
    pub fn new(
        virtual_servers: Arc<dyn VirtualServerReader>,
        certificates: Arc<dyn CertificateStore>,
        events: Arc<dyn EventRecorder>,
        defaults: IssuerDefaults,
        policy: OwnershipPolicy,
    ) -> Self {
        Self {
            virtual_servers,
            certificates,
            events,
            defaults,
            policy,
            metrics: None,
        }
    }

    /// Record reconcile counts, durations and Certificate writes in `metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn warn_event(&self, subject: &ObjectReference, reason: &str, note: String) {
        self.events
            .publish(subject, EventType::Warning, reason, actions::RECONCILE, Some(note))
            .await;
    }

    fn count_operation(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.increment_certificate_operations(operation);
        }
    }

    /// Fetches the VirtualServer behind `key` and syncs it.
    ///
    /// A VirtualServer that no longer exists is not an error; its
    /// Certificates are removed by the API server's garbage collector.
    pub async fn process_item(&self, key: &ObjectKey, cancel: &CancellationToken) -> Result<(), ControllerError> {
        let span = info_span!("reconcile", namespace = %key.namespace, name = %key.name);
        async {
            let Some(vs) = cancellable(
                cancel,
                self.virtual_servers.get_virtual_server(&key.namespace, &key.name),
            )
            .await?
            else {
                info!("VirtualServer {} in work queue no longer exists", key);
                return Ok(());
            };

            let started = Instant::now();
            let result = self.sync(&vs, cancel).await;
            if let Some(metrics) = &self.metrics {
                metrics.increment_reconciliations();
                metrics.observe_reconciliation_duration(started.elapsed().as_secs_f64());
                if result.is_err() {
                    metrics.increment_reconciliation_errors();
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Brings the Certificates owned by `vs` in line with its TLS settings.
    pub async fn sync(&self, vs: &VirtualServer, cancel: &CancellationToken) -> Result<(), ControllerError> {
        if cancel.is_cancelled() {
            return Err(ControllerError::Cancelled);
        }
        let namespace = vs
            .namespace()
            .ok_or_else(|| ControllerError::InvalidResource(format!("VirtualServer {} has no namespace", vs.name_any())))?;
        let subject = vs.object_ref(&());

        let plan = match vs.tls_secret() {
            Some(secret) => {
                let annotations = to_annotations(vs.cert_manager_config());
                let issuer = match resolve_issuer(&self.defaults, &annotations) {
                    Ok(issuer) => issuer,
                    Err(err @ ControllerError::BadConfig { .. }) => {
                        error!(error = %err, "Failed to determine issuer for VirtualServer");
                        self.warn_event(
                            &subject,
                            reasons::BAD_CONFIG,
                            format!("Could not determine issuer for VirtualServer due to bad config: {err}"),
                        )
                        .await;
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                };
                debug!(issuer = %issuer, "Resolved issuer");

                let existing = cancellable(cancel, self.certificates.get_certificate(&namespace, secret)).await?;

                match plan_certificates(vs, &issuer, existing.as_ref(), self.policy) {
                    Ok(plan) => plan,
                    Err(err @ ControllerError::InvalidAnnotation { .. }) => {
                        error!(error = %err, "Invalid cert-manager configuration on VirtualServer");
                        self.warn_event(
                            &subject,
                            reasons::BAD_CONFIG,
                            format!("Could not build Certificate due to bad config: {err}"),
                        )
                        .await;
                        return Err(err);
                    }
                    Err(err) => return Err(err),
                }
            }
            None => {
                debug!("VirtualServer has no tls.secret, no Certificate required");
                CertificatePlan::default()
            }
        };
        if plan.is_empty() {
            debug!("Nothing to create or update, collecting unrequired Certificates");
        }

        for crt in &plan.create {
            let name = crt.name_any();
            cancellable(cancel, self.certificates.create_certificate(crt)).await?;
            self.count_operation("create");
            info!(certificate = %name, "Created Certificate");
            self.events
                .publish(
                    &subject,
                    EventType::Normal,
                    reasons::CREATE_CERTIFICATE,
                    actions::CREATE,
                    Some(format!("Successfully created Certificate {name:?}")),
                )
                .await;
        }

        for crt in &plan.update {
            let name = crt.name_any();
            cancellable(cancel, self.certificates.update_certificate(crt)).await?;
            self.count_operation("update");
            info!(certificate = %name, "Updated Certificate");
            self.events
                .publish(
                    &subject,
                    EventType::Normal,
                    reasons::UPDATE_CERTIFICATE,
                    actions::UPDATE,
                    Some(format!("Successfully updated Certificate {name:?}")),
                )
                .await;
        }

        for crt in &plan.foreign {
            let name = crt.name_any();
            warn!(certificate = %name, "Refusing to update Certificate controlled by another resource");
            self.warn_event(
                &subject,
                reasons::FOREIGNLY_OWNED,
                format!("Certificate {name:?} is controlled by another resource and was not updated"),
            )
            .await;
        }

        let certificates = cancellable(cancel, self.certificates.list_certificates(&namespace, None)).await?;
        for name in find_certificates_to_remove(&certificates, vs) {
            cancellable(cancel, self.certificates.delete_certificate(&namespace, &name)).await?;
            self.count_operation("delete");
            info!(certificate = %name, "Deleted unrequired Certificate");
            self.events
                .publish(
                    &subject,
                    EventType::Normal,
                    reasons::DELETE_CERTIFICATE,
                    actions::DELETE,
                    Some(format!("Successfully deleted unrequired Certificate {name:?}")),
                )
                .await;
        }

        Ok(())
    }
}
