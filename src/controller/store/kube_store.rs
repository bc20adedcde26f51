//! # Kubernetes Object Store
//!
//! [`ObjectStore`] over `kube::Api<DynamicObject>`.

use super::{gvk_of, ObjectStore, StoreError};
use crate::constants::FIELD_MANAGER;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind, Selector};
use kube::Client;
use serde_json::json;
use tracing::debug;

/// Object store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(gvk);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn api_for(&self, obj: &DynamicObject) -> Result<(Api<DynamicObject>, String), StoreError> {
        let gvk = gvk_of(obj)?;
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| StoreError::InvalidObject(format!("{} has no name", gvk.kind)))?;
        Ok((self.api(&gvk, obj.metadata.namespace.as_deref()), name))
    }
}

/// Turn API 404/409 responses into typed store errors
fn classify(err: kube::Error, kind: &str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind: kind.to_string(),
                name: name.to_string(),
            }
        }
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        self.api(gvk, namespace)
            .get_opt(name)
            .await
            .map_err(|e| classify(e, &gvk.kind, name))
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let params = ListParams::default().labels_from(selector);
        let list = self.api(gvk, namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let (api, name) = self.api_for(obj)?;
        let kind = obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        debug!(kind = %kind, name = %name, "Creating resource");
        api.create(&PostParams::default(), obj)
            .await
            .map_err(|e| classify(e, &kind, &name))
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let (api, name) = self.api_for(obj)?;
        let kind = obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        debug!(kind = %kind, name = %name, "Applying resource");
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(obj))
            .await
            .map_err(|e| classify(e, &kind, &name))
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        self.api(gvk, namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| classify(e, &gvk.kind, name))
    }

    async fn patch_status(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        status: serde_json::Value,
    ) -> Result<(), StoreError> {
        let patch = json!({ "status": status });
        self.api(gvk, namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| classify(e, &gvk.kind, name))
    }

    async fn patch_finalizers(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.api(gvk, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| classify(e, &gvk.kind, name))
    }
}
