//! VirtualServer certificate shim CRD definitions
//!
//! Typed models for the NGINX `VirtualServer` resource the shim reads and the
//! cert-manager `Certificate` resource it owns.

/// cert-manager Certificate
pub mod certificate;
/// Owner references
pub mod references;
/// NGINX VirtualServer
pub mod virtual_server;

pub use certificate::*;
pub use references::*;
pub use virtual_server::*;
