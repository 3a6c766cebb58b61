//! Certificate building and planning.
//!
//! A VirtualServer with `tls.secret` set requires exactly one Certificate,
//! named after the secret. Planning compares that desired Certificate with
//! whatever already carries the name and decides between create and update.

use super::annotations::{to_annotations, translate_annotations};
use crate::error::ControllerError;
use crds::{Certificate, CertificateSpec, IssuerReference, KeyUsage, VirtualServer, controller_of, controller_reference, is_controlled_by};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info};

/// What to do with an existing Certificate controlled by someone else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipPolicy {
    /// Log and update anyway
    #[default]
    Advisory,
    /// Leave it alone and report it
    Enforce,
}

/// Writes needed to bring one VirtualServer's Certificates up to date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CertificatePlan {
    /// Certificates that do not exist yet
    pub create: Vec<Certificate>,
    /// Existing Certificates with their spec and labels replaced
    pub update: Vec<Certificate>,
    /// Certificates skipped under [`OwnershipPolicy::Enforce`]
    pub foreign: Vec<Certificate>,
}

impl CertificatePlan {
    /// True when nothing is to be written or reported
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.foreign.is_empty()
    }
}

/// Builds the desired Certificate for `vs`.
pub fn build_certificate(vs: &VirtualServer, issuer: &IssuerReference) -> Result<Certificate, ControllerError> {
    let vs_name = vs.metadata.name.clone().unwrap_or_default();
    let secret = vs
        .tls_secret()
        .ok_or_else(|| ControllerError::InvalidResource(format!("VirtualServer {vs_name} has no tls.secret")))?;
    let owner = controller_reference(vs).map_err(|e| ControllerError::InvalidResource(e.to_string()))?;

    let mut crt = Certificate {
        metadata: ObjectMeta {
            name: Some(secret.to_string()),
            namespace: vs.metadata.namespace.clone(),
            labels: vs.metadata.labels.clone(),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: CertificateSpec {
            secret_name: secret.to_string(),
            dns_names: vec![vs.spec.host.clone()],
            usages: KeyUsage::defaults(),
            issuer_ref: issuer.clone(),
            ..Default::default()
        },
    };

    translate_annotations(&mut crt, &to_annotations(vs.cert_manager_config()))?;
    Ok(crt)
}

/// True when `existing` differs from `desired` in a field the shim manages.
///
/// DNS names are compared in order. Issuer group, duration, renewal and
/// usages are not compared.
pub fn certificate_needs_update(existing: &Certificate, desired: &Certificate) -> bool {
    existing.metadata.name != desired.metadata.name
        || existing.metadata.labels.as_ref().filter(|labels| !labels.is_empty())
            != desired.metadata.labels.as_ref().filter(|labels| !labels.is_empty())
        || existing.spec.common_name != desired.spec.common_name
        || existing.spec.dns_names != desired.spec.dns_names
        || existing.spec.secret_name != desired.spec.secret_name
        || existing.spec.issuer_ref.name != desired.spec.issuer_ref.name
        || existing.spec.issuer_ref.kind != desired.spec.issuer_ref.kind
}

/// Plans the Certificate writes for `vs`.
///
/// `existing` is the Certificate currently named after the VirtualServer's
/// secret, if any. An existing Certificate is always updated with the
/// desired spec and labels; its other metadata is kept.
pub fn plan_certificates(
    vs: &VirtualServer,
    issuer: &IssuerReference,
    existing: Option<&Certificate>,
    policy: OwnershipPolicy,
) -> Result<CertificatePlan, ControllerError> {
    let mut plan = CertificatePlan::default();
    if vs.tls_secret().is_none() {
        return Ok(plan);
    }

    let desired = build_certificate(vs, issuer)?;
    let Some(existing) = existing else {
        plan.create.push(desired);
        return Ok(plan);
    };

    let crt_name = existing.metadata.name.as_deref().unwrap_or_default();
    debug!(certificate = crt_name, "Certificate already exists, ensuring it is up to date");

    let owned = is_controlled_by(existing, vs);
    if controller_of(existing).is_none() {
        info!(certificate = crt_name, "Certificate has no controller");
    } else if !owned {
        info!(certificate = crt_name, "Certificate is controlled by another resource");
    }

    if !certificate_needs_update(existing, &desired) {
        debug!(certificate = crt_name, "Certificate is already up to date");
    }

    if !owned && policy == OwnershipPolicy::Enforce {
        plan.foreign.push(existing.clone());
        return Ok(plan);
    }

    let mut update = existing.clone();
    update.spec = desired.spec;
    update.metadata.labels = desired.metadata.labels;
    plan.update.push(update);
    Ok(plan)
}
