//! Issuer resolution.
//!
//! The issuer for a Certificate starts from the process-wide defaults and is
//! then overridden by the VirtualServer's cert-manager block.

use super::annotations::{AnnotationSet, CLUSTER_ISSUER_KEY, ISSUER_GROUP_KEY, ISSUER_KEY, ISSUER_KIND_KEY};
use crate::error::ControllerError;
use crds::{CERT_MANAGER_GROUP, CLUSTER_ISSUER_KIND, ISSUER_KIND, IssuerReference};

/// Issuer used when a VirtualServer does not name one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerDefaults {
    /// Issuer name; empty means none configured
    pub name: String,
    /// `Issuer`, `ClusterIssuer` or an external kind
    pub kind: String,
    /// API group of the issuer kind
    pub group: String,
}

impl Default for IssuerDefaults {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ISSUER_KIND.to_string(),
            group: CERT_MANAGER_GROUP.to_string(),
        }
    }
}

fn both_set(first: &str, second: &str) -> String {
    format!("both {first:?} and {second:?} may not be set")
}

/// Resolves the issuer reference for one VirtualServer.
///
/// `issuer` selects a namespaced Issuer, `cluster-issuer` a ClusterIssuer;
/// `issuer-kind` and `issuer-group` then override kind and group. Every
/// violation is reported, joined into a single [`ControllerError::BadConfig`].
pub fn resolve_issuer(defaults: &IssuerDefaults, annotations: &AnnotationSet) -> Result<IssuerReference, ControllerError> {
    let mut name = defaults.name.clone();
    let mut kind = defaults.kind.clone();
    let mut group = defaults.group.clone();

    let issuer = annotations.get(ISSUER_KEY);
    if let Some(issuer) = issuer {
        name.clone_from(issuer);
        kind = ISSUER_KIND.to_string();
    }

    let cluster_issuer = annotations.get(CLUSTER_ISSUER_KEY);
    if let Some(cluster_issuer) = cluster_issuer {
        name.clone_from(cluster_issuer);
        kind = CLUSTER_ISSUER_KIND.to_string();
    }

    let issuer_kind = annotations.get(ISSUER_KIND_KEY);
    if let Some(issuer_kind) = issuer_kind {
        kind.clone_from(issuer_kind);
    }

    let issuer_group = annotations.get(ISSUER_GROUP_KEY);
    if let Some(issuer_group) = issuer_group {
        group.clone_from(issuer_group);
    }

    let mut violations = Vec::new();
    if name.is_empty() {
        violations.push("failed to determine issuer name to be used for virtualserver resource".to_string());
    }
    if issuer.is_some() && cluster_issuer.is_some() {
        violations.push(both_set(ISSUER_KEY, CLUSTER_ISSUER_KEY));
    }
    if cluster_issuer.is_some() && issuer_group.is_some() {
        violations.push(both_set(CLUSTER_ISSUER_KEY, ISSUER_GROUP_KEY));
    }
    if cluster_issuer.is_some() && issuer_kind.is_some() {
        violations.push(both_set(CLUSTER_ISSUER_KEY, ISSUER_KIND_KEY));
    }

    if !violations.is_empty() {
        return Err(ControllerError::BadConfig { violations });
    }
    Ok(IssuerReference { name, kind, group })
}
