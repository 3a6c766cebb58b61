//! cert-manager block translation.
//!
//! The VirtualServer's `tls.cert-manager` block is first flattened into the
//! `cert-manager.io/*` annotation keys cert-manager's own ingress-shim
//! understands, then those annotations are applied to a Certificate.

use super::duration::normalize_duration;
use crate::error::ControllerError;
use crds::{Certificate, CertManagerConfig, KeyUsage};
use std::collections::BTreeMap;

/// `spec.commonName`
pub const COMMON_NAME_KEY: &str = "cert-manager.io/common-name";
/// `spec.duration`, Go duration
pub const DURATION_KEY: &str = "cert-manager.io/duration";
/// `spec.renewBefore`, Go duration
pub const RENEW_BEFORE_KEY: &str = "cert-manager.io/renew-before";
/// `spec.usages`, comma separated
pub const USAGES_KEY: &str = "cert-manager.io/usages";
/// Namespaced issuer name
pub const ISSUER_KEY: &str = "cert-manager.io/issuer";
/// ClusterIssuer name
pub const CLUSTER_ISSUER_KEY: &str = "cert-manager.io/cluster-issuer";
/// Issuer kind override, for external issuers
pub const ISSUER_KIND_KEY: &str = "cert-manager.io/issuer-kind";
/// Issuer API group override, for external issuers
pub const ISSUER_GROUP_KEY: &str = "cert-manager.io/issuer-group";

/// Flat `cert-manager.io/*` key/value view of a cert-manager block
pub type AnnotationSet = BTreeMap<String, String>;

/// Flattens a cert-manager block. Empty fields produce no key; a missing
/// block produces an empty set.
pub fn to_annotations(config: Option<&CertManagerConfig>) -> AnnotationSet {
    let Some(config) = config else {
        return AnnotationSet::new();
    };
    [
        (COMMON_NAME_KEY, &config.common_name),
        (DURATION_KEY, &config.duration),
        (RENEW_BEFORE_KEY, &config.renew_before),
        (USAGES_KEY, &config.usages),
        (ISSUER_KEY, &config.issuer),
        (CLUSTER_ISSUER_KEY, &config.cluster_issuer),
        (ISSUER_KIND_KEY, &config.issuer_kind),
        (ISSUER_GROUP_KEY, &config.issuer_group),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(key, value)| (key.to_string(), value.clone()))
    .collect()
}

fn invalid(key: &str, reason: impl ToString) -> ControllerError {
    ControllerError::InvalidAnnotation {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Applies `common-name`, `duration`, `renew-before` and `usages` to `crt`.
///
/// Keys are applied in that order and stop at the first invalid one; fields
/// set before the failure stay set.
pub fn translate_annotations(crt: &mut Certificate, annotations: &AnnotationSet) -> Result<(), ControllerError> {
    if let Some(common_name) = annotations.get(COMMON_NAME_KEY) {
        crt.spec.common_name = Some(common_name.clone());
    }

    if let Some(duration) = annotations.get(DURATION_KEY) {
        let duration = normalize_duration(duration).map_err(|e| invalid(DURATION_KEY, e))?;
        crt.spec.duration = Some(duration);
    }

    if let Some(renew_before) = annotations.get(RENEW_BEFORE_KEY) {
        let renew_before = normalize_duration(renew_before).map_err(|e| invalid(RENEW_BEFORE_KEY, e))?;
        crt.spec.renew_before = Some(renew_before);
    }

    if let Some(usages) = annotations.get(USAGES_KEY) {
        crt.spec.usages = usages
            .split(',')
            .map(|usage| usage.trim_matches(' ').parse::<KeyUsage>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(USAGES_KEY, e))?;
    }

    Ok(())
}
