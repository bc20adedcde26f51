//! # Reconcile
//!
//! One reconciliation pass for a GitOpsSet:
//!
//! 1. Deleted sets prune their inventory and release the finalizer
//! 2. The finalizer is added on first sight
//! 3. Suspended sets are skipped
//! 4. Generators run, their outputs are combined, templates are rendered
//! 5. The inventory is synced and the status written
//!
//! The pass is bounded by the configured reconcile timeout. A pass that
//! fails or times out leaves the inventory untouched.

use super::inventory::{prune, sync_inventory, SyncOutcome};
use super::status::{self, gitopsset_gvk};
use super::types::{resource_key, Reconciler, ReconcilerError};
use crate::constants::FINALIZER;
use crate::controller::combine::cartesian;
use crate::controller::render::RenderedResource;
use crate::crd::GitOpsSet;
use crate::observability::metrics;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Reconcile one GitOpsSet
pub async fn reconcile(
    gitopsset: Arc<GitOpsSet>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    metrics::increment_reconciliations();

    if gitopsset.metadata.deletion_timestamp.is_some() {
        return finalize(&gitopsset, &ctx).await;
    }

    if !gitopsset.finalizers().iter().any(|f| f == FINALIZER) {
        let mut finalizers = gitopsset.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        ctx.store
            .patch_finalizers(
                &gitopsset_gvk(),
                gitopsset.namespace().as_deref(),
                &gitopsset.name_any(),
                finalizers,
            )
            .await
            .map_err(ReconcilerError::Store)?;
        debug!("Added finalizer");
    }

    if gitopsset.spec.suspend {
        info!("GitOpsSet is suspended, skipping reconciliation");
        status::write_status(ctx.store.as_ref(), &gitopsset, status::suspended(&gitopsset))
            .await?;
        return Ok(Action::await_change());
    }

    let timeout = ctx.config.reconcile_timeout();
    let result = tokio::time::timeout(timeout, run_pass(&ctx, &gitopsset))
        .await
        .unwrap_or_else(|_| Err(ReconcilerError::Timeout(timeout)));
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Err(status_err) = status::write_status(
                ctx.store.as_ref(),
                &gitopsset,
                status::failed(&gitopsset, &e),
            )
            .await
            {
                warn!(error = %status_err, "Failed to record failure status");
            }
            return Err(e);
        }
    };

    status::write_status(
        ctx.store.as_ref(),
        &gitopsset,
        status::succeeded(&gitopsset, &outcome),
    )
    .await?;

    let key = resource_key(&gitopsset);
    if ctx.reset_backoff(&key) {
        debug!(resource = %key, "Reset error backoff after successful reconciliation");
    }

    match ctx.generators.interval(&gitopsset.spec.generators) {
        Some(interval) => {
            info!(
                resources = outcome.inventory.entries.len(),
                "Reconciliation succeeded, requeueing in {:?}", interval
            );
            metrics::increment_requeues("interval");
            Ok(Action::requeue(interval))
        }
        None => {
            info!(
                resources = outcome.inventory.entries.len(),
                "Reconciliation succeeded"
            );
            Ok(Action::await_change())
        }
    }
}

/// Generate, combine and render without touching the cluster
pub async fn render_gitopsset(
    ctx: &Reconciler,
    gitopsset: &GitOpsSet,
) -> Result<Vec<RenderedResource>, ReconcilerError> {
    let generator_ctx = ctx.generator_context(gitopsset);
    let lists = ctx
        .generators
        .generate_all(&generator_ctx, &gitopsset.spec.generators)
        .await?;
    let elements = cartesian(&lists, ctx.config.empty_generators_policy);
    debug!(
        generators = lists.len(),
        elements = elements.len(),
        "Combined generator outputs"
    );
    Ok(ctx.renderer.render(gitopsset, &elements)?)
}

/// Render and sync the inventory; status is left to the caller
pub async fn run_pass(
    ctx: &Reconciler,
    gitopsset: &GitOpsSet,
) -> Result<SyncOutcome, ReconcilerError> {
    let rendered = render_gitopsset(ctx, gitopsset).await?;
    let previous = gitopsset
        .status
        .as_ref()
        .and_then(|s| s.inventory.as_ref());
    sync_inventory(ctx.store.as_ref(), &rendered, previous).await
}

/// Prune everything the set created, then release the finalizer
async fn finalize(gitopsset: &GitOpsSet, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    if !gitopsset.finalizers().iter().any(|f| f == FINALIZER) {
        return Ok(Action::await_change());
    }

    let entries = gitopsset
        .status
        .as_ref()
        .and_then(|s| s.inventory.as_ref())
        .map(|i| i.entries.as_slice())
        .unwrap_or_default();
    for entry in entries {
        prune(ctx.store.as_ref(), entry).await?;
    }
    info!(pruned = entries.len(), "Pruned inventory of deleted GitOpsSet");

    let finalizers: Vec<String> = gitopsset
        .finalizers()
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect();
    match ctx
        .store
        .patch_finalizers(
            &gitopsset_gvk(),
            gitopsset.namespace().as_deref(),
            &gitopsset.name_any(),
            finalizers,
        )
        .await
    {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(ReconcilerError::Store(e)),
    }
    if let Ok(mut states) = ctx.backoff_states.lock() {
        states.remove(&resource_key(gitopsset));
    }
    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::fetch::{ArchiveFetcher, FetchError};
    use crate::controller::store::MemoryStore;
    use crate::controller::ErrorClass;
    use crate::crd::{GitOpsSetGenerator, GitOpsSetSpec, GitOpsSetTemplate, ListGenerator};
    use async_trait::async_trait;
    use kube::core::DynamicObject;
    use serde_json::json;
    use std::path::Path;

    #[derive(Debug)]
    struct NoFetch;

    #[async_trait]
    impl ArchiveFetcher for NoFetch {
        async fn fetch(&self, url: &str, _: &str, _: &Path) -> Result<(), FetchError> {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn reconciler(store: Arc<MemoryStore>) -> Arc<Reconciler> {
        Arc::new(Reconciler::with_parts(
            store,
            reqwest::Client::new(),
            Arc::new(NoFetch),
            ControllerConfig::default(),
        ))
    }

    fn gitopsset(envs: &[&str]) -> GitOpsSet {
        let mut gs = GitOpsSet::new(
            "demo-set",
            GitOpsSetSpec {
                generators: vec![GitOpsSetGenerator {
                    list: Some(ListGenerator {
                        elements: envs.iter().map(|env| json!({"env": env})).collect(),
                    }),
                    ..Default::default()
                }],
                templates: vec![GitOpsSetTemplate {
                    content: json!({
                        "apiVersion": "v1",
                        "kind": "ConfigMap",
                        "metadata": {"name": "{{ .env }}-config"},
                        "data": {"env": "{{ .env }}"}
                    }),
                }],
                ..Default::default()
            },
        );
        gs.metadata.namespace = Some("demo".to_string());
        gs.metadata.generation = Some(1);
        gs
    }

    /// Store the set and read it back the way the watcher would deliver it
    async fn stored(store: &MemoryStore, gs: &GitOpsSet) -> Arc<GitOpsSet> {
        use crate::controller::store::ObjectStore;
        let obj: DynamicObject = serde_json::from_value(serde_json::to_value(gs).unwrap()).unwrap();
        if store
            .get(&gitopsset_gvk(), Some("demo"), "demo-set")
            .await
            .unwrap()
            .is_none()
        {
            store.insert(obj).unwrap();
        }
        let current = store
            .get(&gitopsset_gvk(), Some("demo"), "demo-set")
            .await
            .unwrap()
            .unwrap();
        let mut value = serde_json::to_value(current).unwrap();
        value["spec"] = serde_json::to_value(&gs.spec).unwrap();
        Arc::new(serde_json::from_value(value).unwrap())
    }

    #[tokio::test]
    async fn test_reconcile_creates_and_records_inventory() {
        let store = Arc::new(MemoryStore::new());
        let ctx = reconciler(store.clone());
        let gs = stored(&store, &gitopsset(&["dev", "prod"])).await;

        let action = reconcile(gs, ctx.clone()).await.unwrap();
        assert_eq!(action, Action::await_change());

        let cms = store.objects_of(&crate::controller::store::parse_gvk("v1", "ConfigMap"));
        assert_eq!(cms.len(), 2);

        let gs = stored(&store, &gitopsset(&["dev", "prod"])).await;
        assert!(gs.finalizers().iter().any(|f| f == FINALIZER));
        let status = gs.status.clone().unwrap();
        assert_eq!(status.conditions[0].message.as_deref(), Some("2 resources created"));
        assert_eq!(status.inventory.map(|i| i.entries.len()), Some(2));
    }

    #[tokio::test]
    async fn test_suspended_set_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut gs = gitopsset(&["dev"]);
        gs.spec.suspend = true;
        let gs = stored(&store, &gs).await;

        reconcile(gs, reconciler(store.clone())).await.unwrap();
        assert_eq!(store.calls().creates, 0);
    }

    #[tokio::test]
    async fn test_deletion_prunes_inventory() {
        let store = Arc::new(MemoryStore::new());
        let ctx = reconciler(store.clone());
        reconcile(stored(&store, &gitopsset(&["dev"])).await, ctx.clone())
            .await
            .unwrap();

        let gs = stored(&store, &gitopsset(&["dev"])).await;
        let mut deleting = (*gs).clone();
        deleting.metadata.deletion_timestamp = Some(
            k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
        );
        reconcile(Arc::new(deleting), ctx).await.unwrap();

        let cms = store.objects_of(&crate::controller::store::parse_gvk("v1", "ConfigMap"));
        assert!(cms.is_empty());
        let gs = stored(&store, &gitopsset(&["dev"])).await;
        assert!(gs.finalizers().is_empty());
    }

    #[tokio::test]
    async fn test_render_failure_sets_ready_false() {
        let store = Arc::new(MemoryStore::new());
        let mut gs = gitopsset(&["dev"]);
        gs.spec.templates[0].content["data"]["missing"] = json!("{{ .nope }}");
        let gs = stored(&store, &gs).await;

        let err = reconcile(gs, reconciler(store.clone())).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Data);

        let gs = stored(&store, &gitopsset(&["dev"])).await;
        let status = gs.status.clone().unwrap();
        assert_eq!(status.conditions[0].status, "False");
        assert!(status.inventory.is_none());
    }
}
