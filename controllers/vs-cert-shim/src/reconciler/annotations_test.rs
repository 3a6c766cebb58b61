//! Unit tests for the cert-manager block translation

#[cfg(test)]
mod tests {
    use super::super::annotations::*;
    use crate::error::ControllerError;
    use crds::{CertificateSpec, CertManagerConfig, Certificate, KeyUsage};

    fn certificate() -> Certificate {
        let mut crt = Certificate::new("example-tls", CertificateSpec::default());
        crt.spec.usages = KeyUsage::defaults();
        crt
    }

    fn annotations(pairs: &[(&str, &str)]) -> AnnotationSet {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn test_to_annotations_skips_empty_fields() {
        let config = CertManagerConfig {
            cluster_issuer: "letsencrypt".to_string(),
            duration: "2160h".to_string(),
            ..Default::default()
        };
        assert_eq!(
            to_annotations(Some(&config)),
            annotations(&[(CLUSTER_ISSUER_KEY, "letsencrypt"), (DURATION_KEY, "2160h")])
        );
        assert!(to_annotations(None).is_empty());
        assert!(to_annotations(Some(&CertManagerConfig::default())).is_empty());
    }

    #[test]
    fn test_to_annotations_covers_every_field() {
        let config = CertManagerConfig {
            cluster_issuer: "a".to_string(),
            issuer: "b".to_string(),
            issuer_kind: "c".to_string(),
            issuer_group: "d".to_string(),
            common_name: "e".to_string(),
            duration: "f".to_string(),
            renew_before: "g".to_string(),
            usages: "h".to_string(),
        };
        let set = to_annotations(Some(&config));
        assert_eq!(set.len(), 8);
        assert_eq!(set[ISSUER_KIND_KEY], "c");
        assert_eq!(set[RENEW_BEFORE_KEY], "g");
    }

    #[test]
    fn test_translate_sets_fields() {
        let mut crt = certificate();
        translate_annotations(
            &mut crt,
            &annotations(&[
                (COMMON_NAME_KEY, "example.com"),
                (DURATION_KEY, "2160h"),
                (RENEW_BEFORE_KEY, "1440h"),
                (USAGES_KEY, "digital signature, key encipherment,server auth"),
            ]),
        )
        .unwrap();

        assert_eq!(crt.spec.common_name.as_deref(), Some("example.com"));
        assert_eq!(crt.spec.duration.as_deref(), Some("2160h0m0s"));
        assert_eq!(crt.spec.renew_before.as_deref(), Some("1440h0m0s"));
        assert_eq!(
            crt.spec.usages,
            vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment, KeyUsage::ServerAuth]
        );
    }

    #[test]
    fn test_translate_without_annotations_keeps_defaults() {
        let mut crt = certificate();
        translate_annotations(&mut crt, &AnnotationSet::new()).unwrap();
        assert_eq!(crt.spec.usages, KeyUsage::defaults());
        assert_eq!(crt.spec.duration, None);
        assert_eq!(crt.spec.common_name, None);
    }

    #[test]
    fn test_invalid_duration_names_key() {
        let mut crt = certificate();
        let err = translate_annotations(&mut crt, &annotations(&[(DURATION_KEY, "ninety days")])).unwrap_err();
        match err {
            ControllerError::InvalidAnnotation { key, reason } => {
                assert_eq!(key, DURATION_KEY);
                assert_eq!(reason, "time: invalid duration \"ninety days\"");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_renew_before_keeps_earlier_fields() {
        let mut crt = certificate();
        let err = translate_annotations(
            &mut crt,
            &annotations(&[
                (COMMON_NAME_KEY, "example.com"),
                (DURATION_KEY, "720h"),
                (RENEW_BEFORE_KEY, "10"),
            ]),
        )
        .unwrap_err();

        assert!(matches!(err, ControllerError::InvalidAnnotation { ref key, .. } if key == RENEW_BEFORE_KEY));
        assert_eq!(crt.spec.common_name.as_deref(), Some("example.com"));
        assert_eq!(crt.spec.duration.as_deref(), Some("720h0m0s"));
        assert_eq!(crt.spec.renew_before, None);
    }

    #[test]
    fn test_unknown_usage_names_token() {
        let mut crt = certificate();
        let err = translate_annotations(&mut crt, &annotations(&[(USAGES_KEY, "digital signature,teleport")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid cert-manager annotation \"cert-manager.io/usages\": invalid key usage name \"teleport\""
        );
        assert_eq!(crt.spec.usages, KeyUsage::defaults());
    }
}
