//! VirtualServer CRD
//!
//! The NGINX Ingress Controller `VirtualServer` resource. Only the fields
//! consumed by the certificate shim are modelled; everything else in the
//! object is ignored on deserialization.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Fields of a VirtualServer spec the shim reads
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "k8s.nginx.org",
    version = "v1",
    kind = "VirtualServer",
    namespaced,
    shortname = "vs",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerSpec {
    /// Host served by this VirtualServer (becomes the Certificate DNS name)
    pub host: String,

    /// TLS termination settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<VirtualServerTls>,
}

/// `spec.tls` of a VirtualServer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerTls {
    /// Name of the Secret holding the certificate and key
    #[serde(default)]
    pub secret: String,

    /// cert-manager integration settings
    #[serde(
        default,
        rename = "cert-manager",
        skip_serializing_if = "Option::is_none"
    )]
    pub cert_manager: Option<CertManagerConfig>,
}

/// The `tls.cert-manager` block.
///
/// Every field is optional; an empty string is treated the same as an
/// absent field.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CertManagerConfig {
    /// ClusterIssuer to sign with
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_issuer: String,

    /// Namespaced Issuer to sign with
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issuer: String,

    /// Issuer kind override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issuer_kind: String,

    /// Issuer API group override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issuer_group: String,

    /// Certificate common name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub common_name: String,

    /// Go duration string, e.g. `2160h`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub duration: String,

    /// Go duration string, e.g. `1440h`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub renew_before: String,

    /// Comma separated key usages, e.g. `digital signature,key encipherment`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub usages: String,
}

impl VirtualServer {
    /// Secret name declared in `spec.tls.secret`, if any.
    pub fn tls_secret(&self) -> Option<&str> {
        self.spec
            .tls
            .as_ref()
            .map(|tls| tls.secret.as_str())
            .filter(|secret| !secret.is_empty())
    }

    /// The `tls.cert-manager` block, if any.
    pub fn cert_manager_config(&self) -> Option<&CertManagerConfig> {
        self.spec.tls.as_ref().and_then(|tls| tls.cert_manager.as_ref())
    }
}
