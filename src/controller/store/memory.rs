//! # In-memory Object Store
//!
//! [`ObjectStore`] kept entirely in process. Used by tests, and by anything
//! that wants to run the generate/render/reconcile pipeline without a cluster.

use super::{gvk_of, ObjectStore, StoreError};
use async_trait::async_trait;
use kube::core::{DynamicObject, GroupVersionKind, Selector, SelectorExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Number of mutating calls seen by a [`MemoryStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub status_patches: usize,
}

type ObjectKey = (String, String, Option<String>, String);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    calls: StoreCalls,
    failing: BTreeSet<String>,
    next_version: u64,
}

/// Object store held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn key(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        gvk.group.clone(),
        gvk.kind.clone(),
        namespace.map(str::to_string),
        name.to_string(),
    )
}

fn key_of(obj: &DynamicObject) -> Result<ObjectKey, StoreError> {
    let gvk = gvk_of(obj)?;
    let name = obj
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject(format!("{} has no name", gvk.kind)))?;
    Ok(key(&gvk, obj.metadata.namespace.as_deref(), name))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Put an object in place without counting it as a create
    pub fn insert(&self, obj: DynamicObject) -> Result<(), StoreError> {
        let key = key_of(&obj)?;
        let mut state = self.lock();
        let obj = state.stamp(obj);
        state.objects.insert(key, obj);
        Ok(())
    }

    /// Remove an object without counting it as a delete
    pub fn remove(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) {
        self.lock().objects.remove(&key(gvk, namespace, name));
    }

    /// Make creates and updates of objects named `name` fail
    pub fn fail_writes_for(&self, name: &str) {
        self.lock().failing.insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    pub fn calls(&self) -> StoreCalls {
        self.lock().calls
    }

    pub fn reset_calls(&self) {
        self.lock().calls = StoreCalls::default();
    }

    /// Every stored object of the given kind
    pub fn objects_of(&self, gvk: &GroupVersionKind) -> Vec<DynamicObject> {
        self.lock()
            .objects
            .iter()
            .filter(|((group, kind, _, _), _)| *group == gvk.group && *kind == gvk.kind)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl State {
    fn stamp(&mut self, mut obj: DynamicObject) -> DynamicObject {
        self.next_version += 1;
        obj.metadata.resource_version = Some(self.next_version.to_string());
        obj
    }

    fn check_failing(&self, obj: &DynamicObject) -> Result<(), StoreError> {
        match obj.metadata.name.as_deref() {
            Some(name) if self.failing.contains(name) => Err(StoreError::InvalidObject(format!(
                "write to {name} rejected"
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        Ok(self.lock().objects.get(&key(gvk, namespace, name)).cloned())
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let empty = BTreeMap::new();
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|((group, kind, ns, _), _)| {
                *group == gvk.group
                    && *kind == gvk.kind
                    && namespace.is_none_or(|wanted| ns.as_deref() == Some(wanted))
            })
            .filter(|(_, obj)| selector.matches(obj.metadata.labels.as_ref().unwrap_or(&empty)))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = key_of(obj)?;
        let mut state = self.lock();
        state.check_failing(obj)?;
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: key.1,
                name: key.3,
            });
        }
        state.calls.creates += 1;
        let stored = state.stamp(obj.clone());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = key_of(obj)?;
        let mut state = self.lock();
        state.check_failing(obj)?;
        let current = state.objects.get(&key).ok_or_else(|| StoreError::NotFound {
            kind: key.1.clone(),
            name: key.3.clone(),
        })?;
        let mut next = obj.clone();
        // Status belongs to the status subresource
        if let Some(status) = current.data.get("status") {
            if let Some(data) = next.data.as_object_mut() {
                data.insert("status".to_string(), status.clone());
            }
        }
        state.calls.updates += 1;
        let stored = state.stamp(next);
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        match state.objects.remove(&key(gvk, namespace, name)) {
            Some(_) => {
                state.calls.deletes += 1;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: gvk.kind.clone(),
                name: name.to_string(),
            }),
        }
    }

    async fn patch_status(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        status: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let obj = state
            .objects
            .get_mut(&key(gvk, namespace, name))
            .ok_or_else(|| StoreError::NotFound {
                kind: gvk.kind.clone(),
                name: name.to_string(),
            })?;
        let data = obj
            .data
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidObject(format!("{name} has no data")))?;
        let target = data
            .entry("status")
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        merge_patch(target, status);
        state.calls.status_patches += 1;
        Ok(())
    }

    async fn patch_finalizers(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let obj = state
            .objects
            .get_mut(&key(gvk, namespace, name))
            .ok_or_else(|| StoreError::NotFound {
                kind: gvk.kind.clone(),
                name: name.to_string(),
            })?;
        obj.metadata.finalizers = (!finalizers.is_empty()).then_some(finalizers);
        Ok(())
    }
}

/// JSON merge patch (RFC 7386)
fn merge_patch(target: &mut serde_json::Value, patch: serde_json::Value) {
    match patch {
        serde_json::Value::Object(fields) => {
            if !target.is_object() {
                *target = serde_json::Value::Object(serde_json::Map::new());
            }
            if let Some(map) = target.as_object_mut() {
                for (k, v) in fields {
                    if v.is_null() {
                        map.remove(&k);
                    } else {
                        merge_patch(map.entry(k).or_insert(serde_json::Value::Null), v);
                    }
                }
            }
        }
        other => *target = other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::store::parse_gvk;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use serde_json::json;

    fn config_map(name: &str, labels: serde_json::Value) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": "default", "labels": labels},
            "data": {"key": "value"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_filters_by_selector_and_namespace() {
        let store = MemoryStore::new();
        store.insert(config_map("a", json!({"team": "ops"}))).unwrap();
        store.insert(config_map("b", json!({"team": "dev"}))).unwrap();

        let gvk = parse_gvk("v1", "ConfigMap");
        let selector: LabelSelector =
            serde_json::from_value(json!({"matchLabels": {"team": "ops"}})).unwrap();
        let selector = Selector::try_from(selector).unwrap();

        let found = store.list(&gvk, Some("default"), &selector).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.name.as_deref(), Some("a"));

        let elsewhere = store.list(&gvk, Some("other"), &selector).await.unwrap();
        assert!(elsewhere.is_empty());
    }

    #[tokio::test]
    async fn test_create_update_delete_are_counted() {
        let store = MemoryStore::new();
        let obj = config_map("a", json!({}));
        let gvk = parse_gvk("v1", "ConfigMap");

        store.create(&obj).await.unwrap();
        assert!(matches!(
            store.create(&obj).await,
            Err(StoreError::AlreadyExists { .. })
        ));
        store.update(&obj).await.unwrap();
        store.delete(&gvk, Some("default"), "a").await.unwrap();
        assert!(store
            .delete(&gvk, Some("default"), "a")
            .await
            .unwrap_err()
            .is_not_found());

        assert_eq!(
            store.calls(),
            StoreCalls {
                creates: 1,
                updates: 1,
                deletes: 1,
                status_patches: 0
            }
        );
    }

    #[tokio::test]
    async fn test_patch_status_merges() {
        let store = MemoryStore::new();
        store.insert(config_map("a", json!({}))).unwrap();
        let gvk = parse_gvk("v1", "ConfigMap");

        store
            .patch_status(&gvk, Some("default"), "a", json!({"one": 1, "two": 2}))
            .await
            .unwrap();
        store
            .patch_status(&gvk, Some("default"), "a", json!({"two": null, "three": 3}))
            .await
            .unwrap();

        let obj = store.get(&gvk, Some("default"), "a").await.unwrap().unwrap();
        assert_eq!(obj.data["status"], json!({"one": 1, "three": 3}));
    }
}
