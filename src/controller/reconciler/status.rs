//! # Status
//!
//! Builds the GitOpsSet status after a pass and writes it through the
//! object store. Writes are skipped when the status would not change.

use super::inventory::SyncOutcome;
use super::types::ReconcilerError;
use crate::constants::{READY_CONDITION, REASON_FAILED, REASON_SUCCEEDED, REASON_SUSPENDED};
use crate::controller::store::ObjectStore;
use crate::crd::{Condition, GitOpsSet, GitOpsSetStatus};
use kube::core::GroupVersionKind;
use kube::{Resource, ResourceExt};
use tracing::debug;

/// Group/version/kind of the GitOpsSet resource itself
pub fn gitopsset_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(
        &GitOpsSet::group(&()),
        &GitOpsSet::version(&()),
        &GitOpsSet::kind(&()),
    )
}

/// Replace the Ready condition
///
/// `lastTransitionTime` only moves when the condition status flips.
pub fn set_ready(conditions: &mut Vec<Condition>, ready: bool, reason: &str, message: String) {
    let status = if ready { "True" } else { "False" };
    let previous = conditions
        .iter()
        .position(|c| c.r#type == READY_CONDITION)
        .map(|i| conditions.remove(i));

    let last_transition_time = match previous {
        Some(prev) if prev.status == status => prev.last_transition_time,
        _ => Some(chrono::Utc::now().to_rfc3339()),
    };

    conditions.push(Condition {
        r#type: READY_CONDITION.to_string(),
        status: status.to_string(),
        last_transition_time,
        reason: Some(reason.to_string()),
        message: Some(message),
    });
}

/// Status after a successful pass
pub fn succeeded(gitopsset: &GitOpsSet, outcome: &SyncOutcome) -> GitOpsSetStatus {
    let mut status = gitopsset.status.clone().unwrap_or_default();
    status.observed_generation = gitopsset.metadata.generation;
    status.inventory = Some(outcome.inventory.clone());
    set_ready(
        &mut status.conditions,
        true,
        REASON_SUCCEEDED,
        format!("{} resources created", outcome.inventory.entries.len()),
    );
    status
}

/// Status after a failed pass; the inventory is left as it was
pub fn failed(gitopsset: &GitOpsSet, error: &ReconcilerError) -> GitOpsSetStatus {
    let mut status = gitopsset.status.clone().unwrap_or_default();
    set_ready(&mut status.conditions, false, REASON_FAILED, error.to_string());
    status
}

pub fn suspended(gitopsset: &GitOpsSet) -> GitOpsSetStatus {
    let mut status = gitopsset.status.clone().unwrap_or_default();
    set_ready(
        &mut status.conditions,
        false,
        REASON_SUSPENDED,
        "Reconciliation is suspended".to_string(),
    );
    status
}

/// Persist `status`, returning whether a write happened
///
/// A GitOpsSet deleted mid-pass is not an error.
pub async fn write_status(
    store: &dyn ObjectStore,
    gitopsset: &GitOpsSet,
    status: GitOpsSetStatus,
) -> Result<bool, ReconcilerError> {
    if gitopsset.status.as_ref() == Some(&status) {
        debug!("Status unchanged, skipping write");
        return Ok(false);
    }

    let namespace = gitopsset.namespace();
    let name = gitopsset.name_any();
    let patch = serde_json::to_value(&status)
        .map_err(|e| ReconcilerError::Store(crate::controller::store::StoreError::Serialization(e)))?;

    match store
        .patch_status(&gitopsset_gvk(), namespace.as_deref(), &name, patch)
        .await
    {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            debug!("GitOpsSet was deleted during reconciliation, skipping status update");
            Ok(false)
        }
        Err(e) => Err(ReconcilerError::Store(e)),
    }
}
