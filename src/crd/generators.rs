//! # Generator Specifications
//!
//! Each generator entry populates exactly one variant. Variants are optional
//! fields rather than a Rust enum so that an entry with no variant set is
//! still a valid document (it generates nothing).

use crate::constants::DEFAULT_API_CLIENT_INTERVAL;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Names of the generator variants, used as registry keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeneratorKind {
    List,
    Config,
    GitRepository,
    APIClient,
    Cluster,
    Matrix,
}

impl GeneratorKind {
    pub const ALL: [GeneratorKind; 6] = [
        Self::List,
        Self::Config,
        Self::GitRepository,
        Self::APIClient,
        Self::Cluster,
        Self::Matrix,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "List",
            Self::Config => "Config",
            Self::GitRepository => "GitRepository",
            Self::APIClient => "APIClient",
            Self::Cluster => "Cluster",
            Self::Matrix => "Matrix",
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of `spec.generators`
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsSetGenerator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ListGenerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigGenerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repository: Option<GitRepositoryGenerator>,
    #[serde(default, rename = "apiClient", skip_serializing_if = "Option::is_none")]
    pub api_client: Option<APIClientGenerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterGenerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<MatrixGenerator>,
}

impl GitOpsSetGenerator {
    /// Variants populated on this entry, in declaration order
    pub fn kinds(&self) -> Vec<GeneratorKind> {
        let populated = [
            (GeneratorKind::List, self.list.is_some()),
            (GeneratorKind::Config, self.config.is_some()),
            (GeneratorKind::GitRepository, self.git_repository.is_some()),
            (GeneratorKind::APIClient, self.api_client.is_some()),
            (GeneratorKind::Cluster, self.cluster.is_some()),
            (GeneratorKind::Matrix, self.matrix.is_some()),
        ];
        populated
            .into_iter()
            .filter_map(|(kind, set)| set.then_some(kind))
            .collect()
    }

    /// Entries reachable from this one, including nested matrix entries
    pub fn flatten(&self) -> Vec<GitOpsSetGenerator> {
        let mut out = vec![self.clone()];
        if let Some(matrix) = &self.matrix {
            out.extend(matrix.generators.iter().map(GitOpsSetGenerator::from));
        }
        out
    }
}

/// One entry of `matrix.generators`; any variant except another matrix
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsSetNestedGenerator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ListGenerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigGenerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repository: Option<GitRepositoryGenerator>,
    #[serde(default, rename = "apiClient", skip_serializing_if = "Option::is_none")]
    pub api_client: Option<APIClientGenerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterGenerator>,
}

impl From<&GitOpsSetNestedGenerator> for GitOpsSetGenerator {
    fn from(nested: &GitOpsSetNestedGenerator) -> Self {
        Self {
            list: nested.list.clone(),
            config: nested.config.clone(),
            git_repository: nested.git_repository.clone(),
            api_client: nested.api_client.clone(),
            cluster: nested.cluster.clone(),
            matrix: None,
        }
    }
}

/// Static list of elements
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListGenerator {
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::preserve_unknown_array")]
    pub elements: Vec<serde_json::Value>,
}

/// Elements from ConfigMaps or Secrets in the GitOpsSet namespace
///
/// `kind` is kept as a free-form string so that an unsupported kind surfaces
/// as a reconcile error instead of a watch decode failure.
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigGenerator {
    /// ConfigMap or Secret
    pub kind: String,
    /// Name of a single object to read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Label selector for objects to read; an empty selector matches everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::label_selector_schema")]
    pub selector: Option<LabelSelector>,
}

/// Files or directories from a Flux GitRepository artifact
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryGenerator {
    /// Name of the GitRepository in the GitOpsSet namespace
    pub repository_ref: String,
    /// Files parsed into one element each
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<GitRepositoryFileItem>,
    /// Directory glob rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<GitRepositoryDirectoryItem>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryFileItem {
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryDirectoryItem {
    /// Glob pattern relative to the artifact root
    pub path: String,
    /// Remove matches of `path` instead of adding them
    #[serde(default)]
    pub exclude: bool,
}

/// Elements from an HTTP endpoint returning JSON
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct APIClientGenerator {
    pub endpoint: String,
    /// HTTP method, POST is used whenever a body is set
    #[serde(default = "default_method")]
    pub method: String,
    /// JSON request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::preserve_unknown_object")]
    pub body: Option<serde_json::Value>,
    /// ConfigMap or Secret whose entries become request headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers_ref: Option<HeadersReference>,
    /// Expression selecting an array of objects from the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    /// Treat the response as a single object
    #[serde(default)]
    pub single_element: bool,
    /// How often to poll the endpoint
    /// Format: duration string (e.g., "30s", "5m", "1h30m")
    #[serde(default = "default_interval")]
    pub interval: String,
}

impl Default for APIClientGenerator {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            method: default_method(),
            body: None,
            headers_ref: None,
            json_path: None,
            single_element: false,
            interval: default_interval(),
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_interval() -> String {
    DEFAULT_API_CLIENT_INTERVAL.to_string()
}

/// Reference to a ConfigMap or Secret carrying HTTP headers
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeadersReference {
    pub kind: String,
    pub name: String,
}

/// Elements from GitopsCluster objects matching a selector
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGenerator {
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::label_selector_schema")]
    pub selector: LabelSelector,
}

/// Cartesian product of nested generators
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatrixGenerator {
    #[serde(default)]
    pub generators: Vec<GitOpsSetNestedGenerator>,
}
