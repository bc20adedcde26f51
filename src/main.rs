//! # GitOpsSets Controller
//!
//! A Kubernetes controller that renders resource templates from generator
//! outputs and keeps the rendered resources in sync with the cluster.
//!
//! ## Overview
//!
//! For every `GitOpsSet` the controller:
//!
//! 1. **Runs generators** - Lists, ConfigMaps/Secrets, Flux GitRepository artifacts, HTTP APIs, GitopsClusters and matrices of these
//! 2. **Combines outputs** - Takes the cartesian product of all generator outputs
//! 3. **Renders templates** - Expands every template once per combination
//! 4. **Syncs the inventory** - Creates, updates and prunes the rendered resources
//! 5. **Reports status** - Records the inventory and a Ready condition
//!
//! ## Features
//!
//! - **Multi-namespace**: Watches `GitOpsSet` resources across all namespaces
//! - **Input watches**: Changes to referenced GitRepositories, GitopsClusters, ConfigMaps and Secrets trigger reconciliation
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use gitopssets_controller::runtime::initialization::initialize;
use gitopssets_controller::runtime::watch_loop::run_watch_loop;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(init.client, init.reconciler, init.server_state, init.config).await?;

    info!("Controller shutdown complete");
    Ok(())
}
