//! Owner references between shim resources
//!
//! A Certificate points back at the VirtualServer that controls it through a
//! standard Kubernetes controller owner reference: `apiVersion`, `kind`,
//! `name`, `uid` and `controller: true`. The reference is only a record; it
//! is resolved by looking the owner up, and cascading deletion is left to the
//! API server's garbage collector.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use thiserror::Error;

/// Errors building an owner reference
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    /// The owner has not been persisted yet and carries no name or uid
    #[error("{kind} {name:?} has no uid")]
    MissingUid {
        /// Kind of the would-be owner
        kind: String,
        /// Name of the would-be owner
        name: String,
    },
}

/// Builds a controller owner reference pointing at `owner`.
///
/// `blockOwnerDeletion` is set so foreground deletion of the owner waits for
/// its dependents.
pub fn controller_reference<K>(owner: &K) -> Result<OwnerReference, ReferenceError>
where
    K: Resource<DynamicType = ()>,
{
    let mut reference = owner
        .controller_owner_ref(&())
        .ok_or_else(|| ReferenceError::MissingUid {
            kind: K::kind(&()).into_owned(),
            name: owner.meta().name.clone().unwrap_or_default(),
        })?;
    reference.block_owner_deletion = Some(true);
    Ok(reference)
}

/// Returns the owner reference flagged as controller, if any.
pub fn controller_of<K: Resource>(obj: &K) -> Option<&OwnerReference> {
    obj.meta()
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|reference| reference.controller == Some(true))
}

/// True when `obj`'s controller is `owner`.
///
/// Owners are matched by uid, so a recreated owner with the same name does not
/// inherit dependents of its predecessor.
pub fn is_controlled_by<K, O>(obj: &K, owner: &O) -> bool
where
    K: Resource,
    O: Resource,
{
    match (controller_of(obj), owner.meta().uid.as_deref()) {
        (Some(reference), Some(uid)) => reference.uid == uid,
        _ => false,
    }
}
