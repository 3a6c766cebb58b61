//! Unit tests for Certificate building and planning

#[cfg(test)]
mod tests {
    use super::super::certificates::*;
    use crate::error::ControllerError;
    use crate::test_utils::*;
    use crds::*;

    fn issuer() -> IssuerReference {
        IssuerReference::new("letsencrypt", CLUSTER_ISSUER_KIND, "")
    }

    #[test]
    fn test_build_certificate_fields() {
        let vs = with_labels(
            create_test_virtual_server("default", "vs1", "example.com", Some("example-tls"), None),
            &[("app", "web")],
        );
        let crt = build_certificate(&vs, &issuer()).unwrap();

        assert_eq!(crt.metadata.name.as_deref(), Some("example-tls"));
        assert_eq!(crt.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(crt.metadata.labels, vs.metadata.labels);
        assert_eq!(crt.spec.secret_name, "example-tls");
        assert_eq!(crt.spec.dns_names, vec!["example.com"]);
        assert_eq!(crt.spec.usages, KeyUsage::defaults());
        assert_eq!(crt.spec.issuer_ref, issuer());
        assert!(is_controlled_by(&crt, &vs));

        let owner = controller_of(&crt).unwrap();
        assert_eq!(owner.kind, "VirtualServer");
        assert_eq!(owner.api_version, "k8s.nginx.org/v1");
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    #[test]
    fn test_build_certificate_applies_cert_manager_block() {
        let config = CertManagerConfig {
            common_name: "example.com".to_string(),
            duration: "2160h".to_string(),
            usages: "server auth".to_string(),
            ..Default::default()
        };
        let vs = create_test_virtual_server("default", "vs1", "example.com", Some("example-tls"), Some(config));
        let crt = build_certificate(&vs, &issuer()).unwrap();

        assert_eq!(crt.spec.common_name.as_deref(), Some("example.com"));
        assert_eq!(crt.spec.duration.as_deref(), Some("2160h0m0s"));
        assert_eq!(crt.spec.usages, vec![KeyUsage::ServerAuth]);
    }

    #[test]
    fn test_build_certificate_requires_uid() {
        let mut vs = create_test_virtual_server("default", "vs1", "example.com", Some("example-tls"), None);
        vs.metadata.uid = None;
        assert!(matches!(
            build_certificate(&vs, &issuer()),
            Err(ControllerError::InvalidResource(_))
        ));
    }

    #[test]
    fn test_plan_creates_when_absent() {
        let vs = create_test_virtual_server("default", "vs1", "example.com", Some("example-tls"), None);
        let plan = plan_certificates(&vs, &issuer(), None, OwnershipPolicy::Advisory).unwrap();

        assert_eq!(plan.create.len(), 1);
        assert!(plan.update.is_empty());
        assert!(plan.foreign.is_empty());
        assert_eq!(plan.create[0].spec.issuer_ref, issuer());
    }

    #[test]
    fn test_plan_updates_even_when_identical() {
        let vs = create_test_virtual_server("default", "vs1", "example.com", Some("example-tls"), None);
        let mut existing = build_certificate(&vs, &issuer()).unwrap();
        existing.metadata.resource_version = Some("42".to_string());
        existing.metadata.uid = Some("cert-uid".to_string());
        assert!(!certificate_needs_update(&existing, &build_certificate(&vs, &issuer()).unwrap()));

        let plan = plan_certificates(&vs, &issuer(), Some(&existing), OwnershipPolicy::Advisory).unwrap();
        assert!(plan.create.is_empty());
        assert_eq!(plan.update, vec![existing]);
    }

    #[test]
    fn test_plan_update_keeps_existing_metadata() {
        let vs = with_labels(
            create_test_virtual_server("default", "vs1", "example.com", Some("example-tls"), None),
            &[("team", "edge")],
        );
        let mut existing = create_owned_certificate(&vs, "example-tls", "example-tls");
        existing.metadata.resource_version = Some("7".to_string());
        existing.metadata.annotations = Some([("note".to_string(), "keep".to_string())].into());

        let plan = plan_certificates(&vs, &issuer(), Some(&existing), OwnershipPolicy::Advisory).unwrap();
        let update = &plan.update[0];
        assert_eq!(update.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(update.metadata.annotations, existing.metadata.annotations);
        assert_eq!(update.metadata.labels, vs.metadata.labels);
        assert_eq!(update.spec.issuer_ref, issuer());
        assert_eq!(update.spec.dns_names, vec!["example.com"]);
    }

    #[test]
    fn test_plan_foreign_certificate_by_policy() {
        let vs = create_test_virtual_server("default", "vs1", "example.com", Some("example-tls"), None);
        let other = create_test_virtual_server("default", "vs2", "other.com", Some("example-tls"), None);
        let existing = create_owned_certificate(&other, "example-tls", "example-tls");

        let advisory = plan_certificates(&vs, &issuer(), Some(&existing), OwnershipPolicy::Advisory).unwrap();
        assert_eq!(advisory.update.len(), 1);
        assert!(advisory.foreign.is_empty());

        let enforced = plan_certificates(&vs, &issuer(), Some(&existing), OwnershipPolicy::Enforce).unwrap();
        assert!(enforced.update.is_empty());
        assert_eq!(enforced.foreign, vec![existing]);
    }

    #[test]
    fn test_plan_without_tls_is_empty() {
        let vs = create_test_virtual_server("default", "vs1", "example.com", None, None);
        assert!(plan_certificates(&vs, &issuer(), None, OwnershipPolicy::Advisory).unwrap().is_empty());

        let vs = create_test_virtual_server("default", "vs1", "example.com", Some(""), None);
        assert!(plan_certificates(&vs, &issuer(), None, OwnershipPolicy::Advisory).unwrap().is_empty());
    }

    #[test]
    fn test_plan_invalid_annotation() {
        let config = CertManagerConfig {
            renew_before: "soon".to_string(),
            ..Default::default()
        };
        let vs = create_test_virtual_server("default", "vs1", "example.com", Some("example-tls"), Some(config));
        let err = plan_certificates(&vs, &issuer(), None, OwnershipPolicy::Advisory).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidAnnotation { ref key, .. } if key == "cert-manager.io/renew-before"));
    }

    #[test]
    fn test_needs_update_detects_changes() {
        let vs = create_test_virtual_server("default", "vs1", "example.com", Some("example-tls"), None);
        let desired = build_certificate(&vs, &issuer()).unwrap();

        let mut changed = desired.clone();
        changed.spec.dns_names = vec!["other.com".to_string()];
        assert!(certificate_needs_update(&changed, &desired));

        let mut changed = desired.clone();
        changed.spec.issuer_ref.kind = ISSUER_KIND.to_string();
        assert!(certificate_needs_update(&changed, &desired));

        let mut changed = desired.clone();
        changed.spec.common_name = Some("example.com".to_string());
        assert!(certificate_needs_update(&changed, &desired));

        // Not compared
        let mut unchanged = desired.clone();
        unchanged.spec.duration = Some("1h0m0s".to_string());
        unchanged.spec.issuer_ref.group = "example.com".to_string();
        assert!(!certificate_needs_update(&unchanged, &desired));
    }

    #[test]
    fn test_needs_update_dns_order_sensitive() {
        let vs = create_test_virtual_server("default", "vs1", "a.com", Some("example-tls"), None);
        let mut desired = build_certificate(&vs, &issuer()).unwrap();
        desired.spec.dns_names = vec!["a.com".to_string(), "b.com".to_string()];
        let mut reordered = desired.clone();
        reordered.spec.dns_names.reverse();
        assert!(certificate_needs_update(&reordered, &desired));
    }
}
