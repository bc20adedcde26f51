//! # Generators
//!
//! Generators turn one entry of `spec.generators` into a list of
//! [`ParameterElement`]s.
//!
//! ## Kinds
//!
//! - `List` - static elements from the spec
//! - `Config` - ConfigMap or Secret data
//! - `GitRepository` - files or directories of a Flux GitRepository artifact
//! - `APIClient` - JSON returned by an HTTP endpoint
//! - `Cluster` - GitopsCluster objects matching a selector
//! - `Matrix` - cartesian product of nested generators
//!
//! Each kind is a [`Generator`] registered by name in a [`GeneratorRegistry`].
//! Dependencies (object store, HTTP client, artifact fetcher, owning
//! GitOpsSet) travel in a [`GeneratorContext`].

mod api_client;
mod cluster;
mod config;
mod element;
mod error;
mod git_repository;
mod list;
mod matrix;

pub use api_client::ApiClient;
pub use cluster::ClusterList;
pub use config::ConfigObjects;
pub use element::{ParamValue, ParameterElement};
pub use error::GeneratorError;
pub use git_repository::GitRepositoryArtifact;
pub use list::StaticList;
pub use matrix::Matrix;

use crate::controller::fetch::ArchiveFetcher;
use crate::controller::store::ObjectStore;
use crate::crd::{GeneratorKind, GitOpsSet, GitOpsSetGenerator};
use crate::observability::metrics;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::Selector;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything a generator may use while generating
#[derive(Debug, Clone, Copy)]
pub struct GeneratorContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub http: &'a reqwest::Client,
    pub fetcher: &'a dyn ArchiveFetcher,
    pub owner: &'a GitOpsSet,
}

impl GeneratorContext<'_> {
    /// Namespace of the owning GitOpsSet
    pub fn namespace(&self) -> String {
        self.owner.namespace().unwrap_or_else(|| "default".to_string())
    }
}

/// A generator kind
#[async_trait]
pub trait Generator: Send + Sync + std::fmt::Debug {
    /// Produce elements for `spec`
    ///
    /// `None` is a contract violation. A spec whose own variant is not set
    /// produces no elements.
    async fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        spec: Option<&GitOpsSetGenerator>,
    ) -> Result<Vec<ParameterElement>, GeneratorError>;

    /// How often the owning GitOpsSet should be regenerated, `None` for never
    fn interval(&self, spec: &GitOpsSetGenerator) -> Option<Duration>;
}

/// Generators keyed by kind
#[derive(Debug, Clone, Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<GeneratorKind, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind
    pub fn standard() -> Self {
        let leaves = Self::new()
            .with(GeneratorKind::List, Arc::new(StaticList))
            .with(GeneratorKind::Config, Arc::new(ConfigObjects))
            .with(GeneratorKind::GitRepository, Arc::new(GitRepositoryArtifact))
            .with(GeneratorKind::APIClient, Arc::new(ApiClient))
            .with(GeneratorKind::Cluster, Arc::new(ClusterList));
        let matrix = Matrix::new(leaves.clone());
        leaves.with(GeneratorKind::Matrix, Arc::new(matrix))
    }

    #[must_use]
    pub fn with(mut self, kind: GeneratorKind, generator: Arc<dyn Generator>) -> Self {
        self.register(kind, generator);
        self
    }

    pub fn register(&mut self, kind: GeneratorKind, generator: Arc<dyn Generator>) {
        self.generators.insert(kind, generator);
    }

    pub fn get(&self, kind: GeneratorKind) -> Option<&Arc<dyn Generator>> {
        self.generators.get(&kind)
    }

    /// Generator responsible for `spec`, `None` when no variant is set
    pub fn resolve(
        &self,
        spec: &GitOpsSetGenerator,
    ) -> Result<Option<(GeneratorKind, &Arc<dyn Generator>)>, GeneratorError> {
        let kinds = spec.kinds();
        match kinds.as_slice() {
            [] => Ok(None),
            [kind] => self
                .get(*kind)
                .map(|generator| Some((*kind, generator)))
                .ok_or_else(|| GeneratorError::Unregistered(kind.to_string())),
            many => Err(GeneratorError::AmbiguousGenerator(
                many.iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }

    /// Generate every entry in declaration order
    ///
    /// Entries with no variant set contribute nothing, not even an empty list.
    pub async fn generate_all(
        &self,
        ctx: &GeneratorContext<'_>,
        specs: &[GitOpsSetGenerator],
    ) -> Result<Vec<Vec<ParameterElement>>, GeneratorError> {
        let mut lists = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let Some((kind, generator)) = self.resolve(spec)? else {
                debug!(index, "Skipping generator entry with no generator set");
                continue;
            };

            match generator.generate(ctx, Some(spec)).await {
                Ok(elements) => {
                    debug!(index, kind = %kind, elements = elements.len(), "Generated elements");
                    lists.push(elements);
                }
                Err(e) => {
                    metrics::increment_generator_errors(kind.as_str());
                    warn!(index, kind = %kind, error = %e, "Generator failed");
                    return Err(e);
                }
            }
        }
        Ok(lists)
    }

    /// Shortest requeue interval of all entries, `None` when nothing polls
    pub fn interval(&self, specs: &[GitOpsSetGenerator]) -> Option<Duration> {
        specs
            .iter()
            .filter_map(|spec| match self.resolve(spec) {
                Ok(Some((_, generator))) => generator.interval(spec),
                _ => None,
            })
            .min()
    }
}

/// Convert a Kubernetes label selector, rejecting malformed expressions
pub(crate) fn parse_selector(selector: &LabelSelector) -> Result<Selector, GeneratorError> {
    Selector::try_from(selector.clone()).map_err(|e| GeneratorError::InvalidSelector(e.to_string()))
}
