//! Prints the CRD manifests for the resources the shim works with.
//!
//! Neither CRD is owned by this project; the output is meant for kind/k3d
//! clusters used in local testing where NGINX Ingress and cert-manager are not
//! installed.

use crds::{Certificate, VirtualServer};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&VirtualServer::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&Certificate::crd())?);
    Ok(())
}
