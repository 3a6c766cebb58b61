//! cert-manager Certificate CRD
//!
//! The subset of `cert-manager.io/v1` `Certificate` written by the shim.
//! See <https://cert-manager.io/docs/reference/api-docs/#cert-manager.io/v1.Certificate>.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// API group of cert-manager's own issuer kinds
pub const CERT_MANAGER_GROUP: &str = "cert-manager.io";

/// Namespaced issuer kind
pub const ISSUER_KIND: &str = "Issuer";

/// Cluster scoped issuer kind
pub const CLUSTER_ISSUER_KIND: &str = "ClusterIssuer";

/// Desired state of a cert-manager Certificate
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    namespaced,
    shortname = "cert",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Secret the issued key pair is written to
    pub secret_name: String,

    /// Subject common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    /// Subject alternative DNS names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,

    /// Requested validity, Go duration format (`2160h0m0s`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Renewal lead time, Go duration format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<String>,

    /// Requested key usages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usages: Vec<KeyUsage>,

    /// Issuer that signs the certificate
    pub issuer_ref: IssuerReference,
}

/// Reference to the issuer that signs a Certificate.
///
/// An empty `kind` or `group` is omitted on the wire; cert-manager then
/// falls back to `Issuer` in the `cert-manager.io` group.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IssuerReference {
    /// Issuer name
    pub name: String,

    /// Issuer kind, `Issuer` when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// Issuer API group, `cert-manager.io` when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
}

impl IssuerReference {
    /// Reference to issuer `name`; empty `kind` and `group` use cert-manager's defaults
    pub fn new(name: impl Into<String>, kind: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for IssuerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.kind.is_empty() { ISSUER_KIND } else { &self.kind };
        let group = if self.group.is_empty() { CERT_MANAGER_GROUP } else { &self.group };
        write!(f, "{kind}.{group}/{}", self.name)
    }
}

/// Unknown key usage token
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid key usage name {0:?}")]
pub struct UnknownKeyUsage(pub String);

/// Key usage and extended key usage tokens understood by cert-manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyUsage {
    #[serde(rename = "signing")]
    Signing,
    #[serde(rename = "digital signature")]
    DigitalSignature,
    #[serde(rename = "content commitment")]
    ContentCommitment,
    #[serde(rename = "key encipherment")]
    KeyEncipherment,
    #[serde(rename = "key agreement")]
    KeyAgreement,
    #[serde(rename = "data encipherment")]
    DataEncipherment,
    #[serde(rename = "cert sign")]
    CertSign,
    #[serde(rename = "crl sign")]
    CrlSign,
    #[serde(rename = "encipher only")]
    EncipherOnly,
    #[serde(rename = "decipher only")]
    DecipherOnly,
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "server auth")]
    ServerAuth,
    #[serde(rename = "client auth")]
    ClientAuth,
    #[serde(rename = "code signing")]
    CodeSigning,
    #[serde(rename = "email protection")]
    EmailProtection,
    #[serde(rename = "s/mime")]
    Smime,
    #[serde(rename = "ipsec end system")]
    IpsecEndSystem,
    #[serde(rename = "ipsec tunnel")]
    IpsecTunnel,
    #[serde(rename = "ipsec user")]
    IpsecUser,
    #[serde(rename = "timestamping")]
    Timestamping,
    #[serde(rename = "ocsp signing")]
    OcspSigning,
    #[serde(rename = "microsoft sgc")]
    MicrosoftSgc,
    #[serde(rename = "netscape sgc")]
    NetscapeSgc,
}

impl KeyUsage {
    /// Every known token, key usages first.
    pub const ALL: [KeyUsage; 23] = [
        KeyUsage::Signing,
        KeyUsage::DigitalSignature,
        KeyUsage::ContentCommitment,
        KeyUsage::KeyEncipherment,
        KeyUsage::KeyAgreement,
        KeyUsage::DataEncipherment,
        KeyUsage::CertSign,
        KeyUsage::CrlSign,
        KeyUsage::EncipherOnly,
        KeyUsage::DecipherOnly,
        KeyUsage::Any,
        KeyUsage::ServerAuth,
        KeyUsage::ClientAuth,
        KeyUsage::CodeSigning,
        KeyUsage::EmailProtection,
        KeyUsage::Smime,
        KeyUsage::IpsecEndSystem,
        KeyUsage::IpsecTunnel,
        KeyUsage::IpsecUser,
        KeyUsage::Timestamping,
        KeyUsage::OcspSigning,
        KeyUsage::MicrosoftSgc,
        KeyUsage::NetscapeSgc,
    ];

    /// Usages cert-manager applies when none are requested.
    pub fn defaults() -> Vec<KeyUsage> {
        vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment]
    }

    /// Token as written in `spec.usages`
    pub fn as_str(self) -> &'static str {
        match self {
            KeyUsage::Signing => "signing",
            KeyUsage::DigitalSignature => "digital signature",
            KeyUsage::ContentCommitment => "content commitment",
            KeyUsage::KeyEncipherment => "key encipherment",
            KeyUsage::KeyAgreement => "key agreement",
            KeyUsage::DataEncipherment => "data encipherment",
            KeyUsage::CertSign => "cert sign",
            KeyUsage::CrlSign => "crl sign",
            KeyUsage::EncipherOnly => "encipher only",
            KeyUsage::DecipherOnly => "decipher only",
            KeyUsage::Any => "any",
            KeyUsage::ServerAuth => "server auth",
            KeyUsage::ClientAuth => "client auth",
            KeyUsage::CodeSigning => "code signing",
            KeyUsage::EmailProtection => "email protection",
            KeyUsage::Smime => "s/mime",
            KeyUsage::IpsecEndSystem => "ipsec end system",
            KeyUsage::IpsecTunnel => "ipsec tunnel",
            KeyUsage::IpsecUser => "ipsec user",
            KeyUsage::Timestamping => "timestamping",
            KeyUsage::OcspSigning => "ocsp signing",
            KeyUsage::MicrosoftSgc => "microsoft sgc",
            KeyUsage::NetscapeSgc => "netscape sgc",
        }
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyUsage {
    type Err = UnknownKeyUsage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyUsage::ALL
            .into_iter()
            .find(|usage| usage.as_str() == s)
            .ok_or_else(|| UnknownKeyUsage(s.to_string()))
    }
}
