//! # Cluster Generator
//!
//! One element per `GitopsCluster` in the owning namespace matching the
//! selector.

use super::{parse_selector, Generator, GeneratorContext, GeneratorError, ParameterElement};
use crate::crd::GitOpsSetGenerator;
use async_trait::async_trait;
use kube::core::{DynamicObject, GroupVersionKind};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

const GITOPS_CLUSTER_GROUP: &str = "gitops.weave.works";
const GITOPS_CLUSTER_VERSION: &str = "v1alpha1";
const GITOPS_CLUSTER_KIND: &str = "GitopsCluster";

#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterList;

#[async_trait]
impl Generator for ClusterList {
    async fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        spec: Option<&GitOpsSetGenerator>,
    ) -> Result<Vec<ParameterElement>, GeneratorError> {
        let spec = spec.ok_or(GeneratorError::EmptyOwningObject)?;
        let Some(cluster) = &spec.cluster else {
            return Ok(Vec::new());
        };

        let selector = parse_selector(&cluster.selector)?;
        info!(selector = %selector, "Generating params from Cluster generator");

        let namespace = ctx.namespace();
        let gvk = GroupVersionKind::gvk(
            GITOPS_CLUSTER_GROUP,
            GITOPS_CLUSTER_VERSION,
            GITOPS_CLUSTER_KIND,
        );
        let clusters = ctx
            .store
            .list(&gvk, Some(&namespace), &selector)
            .await
            .map_err(|source| GeneratorError::Lookup {
                kind: GITOPS_CLUSTER_KIND.to_string(),
                namespace: namespace.clone(),
                name: selector.to_string(),
                source,
            })?;

        Ok(clusters.iter().map(cluster_params).collect())
    }

    fn interval(&self, _spec: &GitOpsSetGenerator) -> Option<Duration> {
        None
    }
}

fn cluster_params(cluster: &DynamicObject) -> ParameterElement {
    let meta = &cluster.metadata;
    let mut element = ParameterElement::new();
    element.insert("ClusterName", meta.name.clone().unwrap_or_default());
    element.insert("ClusterNamespace", meta.namespace.clone().unwrap_or_default());
    element.insert("ClusterLabels", string_map(meta.labels.as_ref()));
    element.insert("ClusterAnnotations", string_map(meta.annotations.as_ref()));
    element
}

fn string_map(map: Option<&BTreeMap<String, String>>) -> Value {
    Value::Object(
        map.into_iter()
            .flatten()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<Map<_, _>>(),
    )
}
