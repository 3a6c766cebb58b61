//! Garbage collection of unrequired Certificates.
//!
//! Only Certificates whose controller reference points at the VirtualServer
//! (by uid) are ever considered; anything else in the namespace is left
//! alone.

use crds::{Certificate, VirtualServer, is_controlled_by};
use std::collections::BTreeSet;

/// Secret names the VirtualServer currently needs Certificates for
pub fn required_secret_names(vs: &VirtualServer) -> BTreeSet<String> {
    vs.tls_secret().map(str::to_string).into_iter().collect()
}

/// Names of Certificates controlled by `vs` that it no longer requires
pub fn find_certificates_to_remove(certificates: &[Certificate], vs: &VirtualServer) -> Vec<String> {
    let required = required_secret_names(vs);
    certificates
        .iter()
        .filter(|crt| is_controlled_by(*crt, vs))
        .filter(|crt| !required.contains(&crt.spec.secret_name))
        .filter_map(|crt| crt.metadata.name.clone())
        .collect()
}
