//! # Object Store
//!
//! Boundary between the reconciler and the Kubernetes API.
//!
//! Generators and the inventory reconciler only talk to an [`ObjectStore`],
//! so the whole pipeline can run against [`MemoryStore`] in tests and against
//! [`KubeStore`] in the cluster.

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::{MemoryStore, StoreCalls};

use async_trait::async_trait;
use kube::core::{DynamicObject, GroupVersionKind, Selector};
use thiserror::Error;

/// Errors returned by an [`ObjectStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Typed access to cluster objects by group/version/kind
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Fetch one object, `None` when it does not exist
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError>;

    /// List objects whose labels match `selector`
    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Bring an existing object in line with `obj`
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Delete one object, [`StoreError::NotFound`] when it is already gone
    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError>;

    /// Merge `status` into the object's status subresource
    async fn patch_status(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        status: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Replace the object's finalizer list
    async fn patch_finalizers(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError>;
}

/// Group/version/kind of a dynamic object, taken from its `apiVersion` and `kind`
pub fn gvk_of(obj: &DynamicObject) -> Result<GroupVersionKind, StoreError> {
    let types = obj.types.as_ref().ok_or_else(|| {
        StoreError::InvalidObject(format!(
            "object {} has no apiVersion/kind",
            obj.metadata.name.as_deref().unwrap_or_default()
        ))
    })?;
    Ok(parse_gvk(&types.api_version, &types.kind))
}

/// Split an `apiVersion` into group and version
pub fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}
