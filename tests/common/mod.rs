//! Common test utilities for integration tests
//!
//! Builders for GitOpsSets and the objects generators read, a reconciler
//! wired to an in-memory store, and a throwaway HTTP server.

#![allow(dead_code, reason = "each test binary uses a subset of the helpers")]

use async_trait::async_trait;
use gitopssets_controller::controller::fetch::{ArchiveFetcher, FetchError, HttpArchiveFetcher};
use gitopssets_controller::prelude::*;
use kube::core::{DynamicObject, GroupVersionKind};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Once};
use tokio::net::TcpListener;

pub const NAMESPACE: &str = "demo";
pub const NAME: &str = "demo-set";

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Must run before any HTTP client is built. Uses a `Once` so it only
/// happens once per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

/// Fetcher for sets that never read artifacts
#[derive(Debug)]
pub struct NoFetch;

#[async_trait]
impl ArchiveFetcher for NoFetch {
    async fn fetch(&self, url: &str, _checksum: &str, _dir: &Path) -> Result<(), FetchError> {
        Err(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// Reconciler over `store` with the default configuration
pub fn reconciler(store: Arc<MemoryStore>) -> Arc<Reconciler> {
    reconciler_with(store, ControllerConfig::default())
}

pub fn reconciler_with(store: Arc<MemoryStore>, config: ControllerConfig) -> Arc<Reconciler> {
    init_rustls();
    Arc::new(Reconciler::with_parts(
        store,
        reqwest::Client::new(),
        Arc::new(NoFetch),
        config,
    ))
}

/// Reconciler that downloads artifacts over HTTP
pub fn fetching_reconciler(store: Arc<MemoryStore>) -> Arc<Reconciler> {
    init_rustls();
    let config = ControllerConfig::default();
    let http = reqwest::Client::new();
    let mut fetch_config = config.fetch_config();
    fetch_config.retries = 0;
    let fetcher = HttpArchiveFetcher::new(http.clone(), fetch_config);
    Arc::new(Reconciler::with_parts(store, http, Arc::new(fetcher), config))
}

pub fn gitopsset(generators: Vec<GitOpsSetGenerator>, templates: Vec<Value>) -> GitOpsSet {
    let mut gs = GitOpsSet::new(
        NAME,
        GitOpsSetSpec {
            generators,
            templates: templates
                .into_iter()
                .map(|content| GitOpsSetTemplate { content })
                .collect(),
            ..Default::default()
        },
    );
    gs.metadata.namespace = Some(NAMESPACE.to_string());
    gs.metadata.generation = Some(1);
    gs
}

pub fn list_generator(elements: Vec<Value>) -> GitOpsSetGenerator {
    GitOpsSetGenerator {
        list: Some(ListGenerator { elements }),
        ..Default::default()
    }
}

pub fn selector(labels: Value) -> k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector {
    serde_json::from_value(json!({ "matchLabels": labels })).unwrap()
}

/// ConfigMap template named after `field`
pub fn config_map_template(field: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": format!("{{{{ .{field} }}}}-config") },
        "data": { "value": format!("{{{{ .{field} }}}}") }
    })
}

pub fn gitopsset_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("templates.weave.works", "v1alpha1", "GitOpsSet")
}

pub fn config_map_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("", "v1", "ConfigMap")
}

/// Store the set and read it back the way the watcher would deliver it
///
/// `gs.spec` always wins; metadata and status come from the store
/// once the set has been stored.
pub async fn stored(store: &MemoryStore, gs: &GitOpsSet) -> Arc<GitOpsSet> {
    let gvk = gitopsset_gvk();
    if store.get(&gvk, Some(NAMESPACE), NAME).await.unwrap().is_none() {
        store.insert(dynamic(serde_json::to_value(gs).unwrap())).unwrap();
    }
    let current = store.get(&gvk, Some(NAMESPACE), NAME).await.unwrap().unwrap();
    let mut value = serde_json::to_value(current).unwrap();
    value["spec"] = serde_json::to_value(&gs.spec).unwrap();
    Arc::new(serde_json::from_value(value).unwrap())
}

pub fn dynamic(value: Value) -> DynamicObject {
    serde_json::from_value(value).unwrap()
}

pub fn gitops_cluster(name: &str, labels: Value) -> DynamicObject {
    dynamic(json!({
        "apiVersion": "gitops.weave.works/v1alpha1",
        "kind": "GitopsCluster",
        "metadata": { "name": name, "namespace": NAMESPACE, "labels": labels },
        "spec": {}
    }))
}

pub fn config_map(name: &str, labels: Value, data: Value) -> DynamicObject {
    dynamic(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name, "namespace": NAMESPACE, "labels": labels },
        "data": data
    }))
}

pub fn secret(name: &str, data: Value) -> DynamicObject {
    dynamic(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": NAMESPACE },
        "data": data
    }))
}

/// A Flux GitRepository, with an artifact when `artifact` is set
pub fn git_repository(name: &str, artifact: Option<(&str, &str)>) -> DynamicObject {
    let status = match artifact {
        Some((url, digest)) => json!({ "artifact": { "url": url, "digest": digest } }),
        None => json!({}),
    };
    dynamic(json!({
        "apiVersion": "source.toolkit.fluxcd.io/v1beta2",
        "kind": "GitRepository",
        "metadata": { "name": name, "namespace": NAMESPACE },
        "spec": { "url": "https://github.com/example/repo" },
        "status": status
    }))
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn serve(router: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Name of every object in `objects`, sorted
pub fn names(objects: &[DynamicObject]) -> Vec<String> {
    let mut names: Vec<String> = objects
        .iter()
        .filter_map(|o| o.metadata.name.clone())
        .collect();
    names.sort();
    names
}

/// Message of the Ready condition
pub fn ready_message(gs: &GitOpsSet) -> Option<String> {
    gs.status
        .as_ref()?
        .conditions
        .iter()
        .find(|c| c.r#type == "Ready")
        .and_then(|c| c.message.clone())
}
