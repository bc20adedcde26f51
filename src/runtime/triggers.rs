//! # Triggers
//!
//! Maps changes of generator inputs (GitRepository, GitopsCluster, ConfigMap,
//! Secret) back to the GitOpsSets that read them, so a changed input
//! reconciles its dependents without waiting for a requeue.
//!
//! Named references match by name. Label-selected inputs match every object
//! of the selected kind in the namespace: a watch event only carries the new
//! labels, so an object that just left a selector looks like any other.

use crate::crd::{GitOpsSet, GitOpsSetGenerator};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;

/// The parts of a watched object needed to find its dependents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedObject {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl WatchedObject {
    pub fn of<K: kube::Resource>(kind: &str, obj: &K) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

/// `true` when any generator of `gitopsset`, nested ones included, reads `obj`
pub fn references(gitopsset: &GitOpsSet, obj: &WatchedObject) -> bool {
    if gitopsset.namespace() != obj.namespace {
        return false;
    }
    gitopsset
        .spec
        .generators
        .iter()
        .flat_map(GitOpsSetGenerator::flatten)
        .any(|generator| generator_references(&generator, obj))
}

fn generator_references(generator: &GitOpsSetGenerator, obj: &WatchedObject) -> bool {
    match obj.kind.as_str() {
        "GitRepository" => generator
            .git_repository
            .as_ref()
            .is_some_and(|g| g.repository_ref == obj.name),
        "GitopsCluster" => generator.cluster.is_some(),
        kind @ ("ConfigMap" | "Secret") => {
            let config = generator.config.as_ref().is_some_and(|g| {
                g.kind == kind
                    && (g.name.as_deref() == Some(obj.name.as_str())
                        || g.selector.is_some())
            });
            let headers = generator
                .api_client
                .as_ref()
                .and_then(|g| g.headers_ref.as_ref())
                .is_some_and(|h| h.kind == kind && h.name == obj.name);
            config || headers
        }
        _ => false,
    }
}

/// GitOpsSets in `store` that depend on `obj`
pub fn dependents(store: &Store<GitOpsSet>, obj: &WatchedObject) -> Vec<ObjectRef<GitOpsSet>> {
    store
        .state()
        .iter()
        .filter(|gs| references(gs, obj))
        .map(|gs| ObjectRef::from_obj(gs.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        APIClientGenerator, ClusterGenerator, ConfigGenerator, GitOpsSetNestedGenerator,
        GitOpsSetSpec, GitRepositoryGenerator, HeadersReference, MatrixGenerator,
    };
    use serde_json::json;

    fn gitopsset(generators: Vec<GitOpsSetGenerator>) -> GitOpsSet {
        let mut gs = GitOpsSet::new(
            "demo-set",
            GitOpsSetSpec {
                generators,
                ..Default::default()
            },
        );
        gs.metadata.namespace = Some("demo".to_string());
        gs
    }

    fn watched(kind: &str, name: &str) -> WatchedObject {
        WatchedObject {
            kind: kind.to_string(),
            namespace: Some("demo".to_string()),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_git_repository_by_name() {
        let gs = gitopsset(vec![GitOpsSetGenerator {
            git_repository: Some(GitRepositoryGenerator {
                repository_ref: "infra".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        assert!(references(&gs, &watched("GitRepository", "infra")));
        assert!(!references(&gs, &watched("GitRepository", "apps")));

        let mut elsewhere = watched("GitRepository", "infra");
        elsewhere.namespace = Some("other".to_string());
        assert!(!references(&gs, &elsewhere));
    }

    #[test]
    fn test_config_by_name_or_selector() {
        let by_name = gitopsset(vec![GitOpsSetGenerator {
            config: Some(ConfigGenerator {
                kind: "ConfigMap".to_string(),
                name: Some("envs".to_string()),
                selector: None,
            }),
            ..Default::default()
        }]);
        assert!(references(&by_name, &watched("ConfigMap", "envs")));
        assert!(!references(&by_name, &watched("ConfigMap", "other")));
        assert!(!references(&by_name, &watched("Secret", "envs")));

        let by_selector = gitopsset(vec![GitOpsSetGenerator {
            config: Some(ConfigGenerator {
                kind: "Secret".to_string(),
                name: None,
                selector: Some(
                    serde_json::from_value(json!({"matchLabels": {"team": "a"}})).unwrap(),
                ),
            }),
            ..Default::default()
        }]);
        // Matches regardless of labels, so a Secret leaving the selector counts
        assert!(references(&by_selector, &watched("Secret", "x")));
        assert!(!references(&by_selector, &watched("ConfigMap", "x")));
    }

    #[test]
    fn test_headers_ref_and_nested_cluster() {
        let gs = gitopsset(vec![GitOpsSetGenerator {
            matrix: Some(MatrixGenerator {
                generators: vec![
                    GitOpsSetNestedGenerator {
                        cluster: Some(ClusterGenerator {
                            selector: serde_json::from_value(json!({"matchLabels": {"env": "dev"}}))
                                .unwrap(),
                        }),
                        ..Default::default()
                    },
                    GitOpsSetNestedGenerator {
                        api_client: Some(APIClientGenerator {
                            endpoint: "http://example.com".to_string(),
                            headers_ref: Some(HeadersReference {
                                kind: "Secret".to_string(),
                                name: "token".to_string(),
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                ],
            }),
            ..Default::default()
        }]);

        assert!(references(&gs, &watched("GitopsCluster", "c1")));
        assert!(references(&gs, &watched("Secret", "token")));
        assert!(!references(&gs, &watched("ConfigMap", "token")));
    }

    #[test]
    fn test_cluster_leaving_the_selector_still_triggers() {
        let gs = gitopsset(vec![GitOpsSetGenerator {
            cluster: Some(ClusterGenerator {
                selector: serde_json::from_value(json!({"matchLabels": {"env": "dev"}})).unwrap(),
            }),
            ..Default::default()
        }]);
        // Relabelled from env=dev to env=prod; only the new labels are visible
        assert!(references(&gs, &watched("GitopsCluster", "c1")));
        assert!(!references(&gitopsset(Vec::new()), &watched("GitopsCluster", "c1")));
    }
}
