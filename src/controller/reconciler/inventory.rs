//! # Inventory
//!
//! Applies the rendered resources and prunes what the previous inventory
//! holds but the new render does not.
//!
//! A resource is only written when needed:
//!
//! - absent: created
//! - present, but the rendered manifest is not a subset of it: updated with
//!   the current `resourceVersion`
//! - present and already matching: left alone

use super::types::ReconcilerError;
use crate::controller::render::RenderedResource;
use crate::controller::store::{ObjectStore, StoreError};
use crate::crd::{ResourceInventory, ResourceRef};
use crate::observability::metrics;
use kube::core::GroupVersionKind;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// What one inventory sync did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub pruned: usize,
    /// Inventory to persist on success
    pub inventory: ResourceInventory,
}

pub(crate) fn gvk_of_ref(reference: &ResourceRef) -> GroupVersionKind {
    GroupVersionKind::gvk(&reference.group, &reference.version, &reference.kind)
}

/// Reject renders that produce the same resource twice
pub fn check_duplicates(rendered: &[RenderedResource]) -> Result<(), ReconcilerError> {
    let mut seen = BTreeSet::new();
    for resource in rendered {
        if !seen.insert(resource.reference.object_key()) {
            return Err(ReconcilerError::DuplicateResource(
                resource.reference.to_string(),
            ));
        }
    }
    Ok(())
}

/// `true` when every field of `desired` is present with the same value in `current`
///
/// Arrays must match element for element. A `null` in `desired` also matches
/// an absent field, since the API server drops nulls on write.
pub fn is_subset(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Object(want), Value::Object(have)) => want
            .iter()
            .all(|(k, v)| have.get(k).map_or(v.is_null(), |h| is_subset(v, h))),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| is_subset(w, h))
        }
        (want, have) => want == have,
    }
}

/// Create, update and prune so the cluster matches `rendered`
pub async fn sync_inventory(
    store: &dyn ObjectStore,
    rendered: &[RenderedResource],
    previous: Option<&ResourceInventory>,
) -> Result<SyncOutcome, ReconcilerError> {
    check_duplicates(rendered)?;

    let mut outcome = SyncOutcome::default();
    for resource in rendered {
        apply(store, resource, &mut outcome).await?;
    }

    // A version bump of the same object is not stale
    let desired: BTreeSet<_> = rendered.iter().map(|r| r.reference.object_key()).collect();
    let stale = previous
        .map(|inv| {
            inv.entries
                .iter()
                .filter(|e| !desired.contains(&e.object_key()))
                .collect()
        })
        .unwrap_or_else(Vec::new);
    for entry in stale {
        prune(store, entry).await?;
        outcome.pruned += 1;
    }

    let mut entries: Vec<ResourceRef> = rendered.iter().map(|r| r.reference.clone()).collect();
    entries.sort();
    outcome.inventory = ResourceInventory { entries };

    info!(
        created = outcome.created,
        updated = outcome.updated,
        unchanged = outcome.unchanged,
        pruned = outcome.pruned,
        "Inventory synced"
    );
    Ok(outcome)
}

async fn apply(
    store: &dyn ObjectStore,
    resource: &RenderedResource,
    outcome: &mut SyncOutcome,
) -> Result<(), ReconcilerError> {
    let reference = &resource.reference;
    let apply_error = |source: StoreError| ReconcilerError::Apply {
        resource: reference.to_string(),
        source,
    };

    let current = store
        .get(
            &gvk_of_ref(reference),
            reference.namespace.as_deref(),
            &reference.name,
        )
        .await
        .map_err(apply_error)?;

    match current {
        None => {
            store.create(&resource.object).await.map_err(apply_error)?;
            debug!(resource = %reference, "Created resource");
            metrics::increment_resources_created();
            outcome.created += 1;
        }
        Some(current) => {
            let desired = serde_json::to_value(&resource.object)
                .map_err(|e| apply_error(StoreError::Serialization(e)))?;
            let existing = serde_json::to_value(&current)
                .map_err(|e| apply_error(StoreError::Serialization(e)))?;
            if is_subset(&desired, &existing) {
                outcome.unchanged += 1;
                return Ok(());
            }

            let mut next = resource.object.clone();
            next.metadata.resource_version = current.metadata.resource_version.clone();
            store.update(&next).await.map_err(apply_error)?;
            debug!(resource = %reference, "Updated resource");
            metrics::increment_resources_updated();
            outcome.updated += 1;
        }
    }
    Ok(())
}

/// Delete one inventory entry, tolerating its absence
pub(crate) async fn prune(store: &dyn ObjectStore, entry: &ResourceRef) -> Result<(), ReconcilerError> {
    match store
        .delete(&gvk_of_ref(entry), entry.namespace.as_deref(), &entry.name)
        .await
    {
        Ok(()) => {
            debug!(resource = %entry, "Pruned resource");
            metrics::increment_resources_pruned();
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(resource = %entry, "Resource already gone");
            Ok(())
        }
        Err(source) => Err(ReconcilerError::Prune {
            resource: entry.to_string(),
            source,
        }),
    }
}
