//! # Watch Loop
//!
//! Controller watch loop that monitors GitOpsSet resources, and the objects
//! their generators read, and triggers reconciliation when changes are
//! detected.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use crate::crd::GitOpsSet;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::runtime::triggers::{dependents, WatchedObject};
use crate::server::ServerState;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, ResourceExt};
use kube_runtime::{controller, controller::Action, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

const INITIAL_WATCH_BACKOFF_MS: u64 = 1000;
const MAX_WATCH_BACKOFF_MS: u64 = 30_000;

/// Run the controller watch loop
///
/// Sets up the Kubernetes controller to watch GitOpsSet resources and trigger
/// reconciliation on changes. Handles graceful shutdown and automatic restart
/// on watch stream errors.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: ControllerConfig,
) -> Result<(), anyhow::Error> {
    info!("Starting controller watch loop...");

    let backoff_duration_ms = Arc::new(AtomicU64::new(INITIAL_WATCH_BACKOFF_MS));

    // Mark server as not ready when SIGTERM/SIGINT is received
    let shutdown_server_state = server_state.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Failed to listen for shutdown signal");
            return;
        }
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff_clone = backoff_duration_ms.clone();
        let restart_delay = config.watch_restart_delay_duration();
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        build_controller(&client, &config)
            .shutdown_on_signal()
            .run(
                create_reconcile_fn,
                handle_reconciliation_error,
                reconciler.clone(),
            )
            .filter_map(move |x| {
                let backoff = backoff_clone.clone();
                async move {
                    match &x {
                        Ok(_) => {
                            backoff.store(INITIAL_WATCH_BACKOFF_MS, Ordering::Relaxed);
                            debug!("watch.event.success");
                            Some(x)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                MAX_WATCH_BACKOFF_MS,
                                restart_delay,
                            )
                            .await
                            .map(|()| x)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Controller over all GitOpsSets plus the objects generators read
fn build_controller(client: &Client, config: &ControllerConfig) -> Controller<GitOpsSet> {
    let gitopssets: Api<GitOpsSet> = Api::all(client.clone());
    let controller = Controller::new(gitopssets, watcher::Config::default().any_semantic())
        .with_config(
            controller::Config::default().concurrency(config.max_concurrent_reconciliations),
        );
    let store = controller.store();

    let git_repository = ApiResource::from_gvk(&GroupVersionKind::gvk(
        "source.toolkit.fluxcd.io",
        "v1beta2",
        "GitRepository",
    ));
    let cluster = ApiResource::from_gvk(&GroupVersionKind::gvk(
        "gitops.weave.works",
        "v1alpha1",
        "GitopsCluster",
    ));

    let (s1, s2, s3, s4) = (store.clone(), store.clone(), store.clone(), store);
    controller
        .watches_with(
            Api::<DynamicObject>::all_with(client.clone(), &git_repository),
            git_repository,
            watcher::Config::default(),
            move |obj| dependents(&s1, &WatchedObject::of("GitRepository", &obj)),
        )
        .watches_with(
            Api::<DynamicObject>::all_with(client.clone(), &cluster),
            cluster,
            watcher::Config::default(),
            move |obj| dependents(&s2, &WatchedObject::of("GitopsCluster", &obj)),
        )
        .watches(
            Api::<ConfigMap>::all(client.clone()),
            watcher::Config::default(),
            move |obj| dependents(&s3, &WatchedObject::of("ConfigMap", &obj)),
        )
        .watches(
            Api::<Secret>::all(client.clone()),
            watcher::Config::default(),
            move |obj| dependents(&s4, &WatchedObject::of("Secret", &obj)),
        )
}

/// Reconcile inside a span carrying the resource identity
fn create_reconcile_fn(
    obj: Arc<GitOpsSet>,
    ctx: Arc<Reconciler>,
) -> impl std::future::Future<Output = Result<Action, ReconcilerError>> + Send {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let generation = obj.metadata.generation.unwrap_or(0);
    let observed_generation = obj
        .status
        .as_ref()
        .and_then(|s| s.observed_generation)
        .unwrap_or(0);

    let reconcile_span = tracing::span!(
        tracing::Level::INFO,
        "controller.watch.reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        resource.generation = generation,
        resource.observed_generation = observed_generation
    );

    async move {
        debug!("watch.event.received");
        let result = reconcile(obj, ctx).await;
        match &result {
            Ok(action) => debug!(action = ?action, "watch.event.reconciled"),
            Err(e) => error!(error = %e, "watch.event.reconciliation_failed"),
        }
        result
    }
    .instrument(reconcile_span)
}
