//! # GitOpsSet Spec
//!
//! Main CRD specification types.

use crate::crd::GitOpsSetGenerator;
use serde::{Deserialize, Serialize};

/// GitOpsSet Custom Resource Definition
///
/// A GitOpsSet combines generators with resource templates. Every combination
/// of generator outputs renders every template once, and the resulting
/// resources are kept in sync with the cluster.
///
/// # Example
///
/// ```yaml
/// apiVersion: templates.weave.works/v1alpha1
/// kind: GitOpsSet
/// metadata:
///   name: demo-set
///   namespace: default
/// spec:
///   generators:
///     - list:
///         elements:
///           - env: dev
///             team: dev-team
///           - env: production
///             team: ops-team
///   templates:
///     - content:
///         kind: Kustomization
///         apiVersion: kustomize.toolkit.fluxcd.io/v1
///         metadata:
///           name: "{{ .env }}-demo"
///           labels:
///             app.kubernetes.io/instance: "{{ .env }}"
///             com.example/team: "{{ .team }}"
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "GitOpsSet",
    group = "templates.weave.works",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::GitOpsSetStatus",
    shortname = "gs",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Status", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].message"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsSetSpec {
    /// Suspend reconciliation
    /// When true, the controller skips this GitOpsSet and leaves managed resources alone
    #[serde(default)]
    pub suspend: bool,
    /// Generators produce the parameters that templates are rendered with
    #[serde(default)]
    pub generators: Vec<GitOpsSetGenerator>,
    /// Templates rendered once per combination of generator outputs
    #[serde(default)]
    pub templates: Vec<GitOpsSetTemplate>,
}

/// A single resource template
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsSetTemplate {
    /// Raw manifest with template actions in string values
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::preserve_unknown_object")]
    pub content: serde_json::Value,
}
