//! Store access for the VirtualServer certificate shim
//!
//! The reconciliation core never talks to the API server directly. It goes
//! through two narrow traits:
//!
//! - [`VirtualServerReader`]: point reads of the (read-only) VirtualServer
//! - [`CertificateStore`]: get/list/create/update/delete of owned Certificates
//!
//! [`KubeStore`] implements both on top of a `kube::Client`.
//! [`CachedStore`] serves reads from the controller's reflector caches and
//! passes writes on to another store. With the `test-util` feature,
//! [`MockStore`] provides an in-memory implementation with an operation log
//! and failure injection.
//!
//! # Example
//!
//! ```no_run
//! use cert_store::{CertificateStore, KubeStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeStore::new(client);
//!
//! let certificates = store.list_certificates("default", None).await?;
//! println!("{} certificates in default", certificates.len());
//! # Ok(())
//! # }
//! ```

/// Reads from reflector caches
pub mod cache;
/// API server access
pub mod client;
/// Store errors
pub mod error;
/// Store traits
#[path = "trait.rs"]
pub mod store_trait;
/// In-memory store for tests
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod selector;

pub use cache::CachedStore;
pub use client::KubeStore;
pub use error::StoreError;
pub use store_trait::{CertificateStore, VirtualServerReader};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockStore, OperationKind, StoreOperation};
