//! # GitRepository Generator
//!
//! Fetches the artifact of a Flux `GitRepository` into a scratch directory and
//! generates elements from it:
//!
//! - `files`: each file is parsed as YAML (or JSON) into one element
//! - `directories`: glob rules select directories, each becoming
//!   `{Directory: "./<path>", Base: "<last segment>"}`; rules marked `exclude`
//!   remove their matches no matter where they appear in the list

use super::{Generator, GeneratorContext, GeneratorError, ParameterElement};
use crate::controller::fetch::{resolve_within, secure_join, ScratchDir};
use crate::crd::{GitOpsSetGenerator, GitRepositoryDirectoryItem, GitRepositoryFileItem};
use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use kube::core::GroupVersionKind;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use walkdir::WalkDir;

const GIT_REPOSITORY_GROUP: &str = "source.toolkit.fluxcd.io";
const GIT_REPOSITORY_VERSION: &str = "v1beta2";

#[derive(Debug, Clone, Copy, Default)]
pub struct GitRepositoryArtifact;

/// Location and digest of a published artifact
#[derive(Debug, Clone, PartialEq, Eq)]
struct Artifact {
    url: String,
    checksum: String,
}

#[async_trait]
impl Generator for GitRepositoryArtifact {
    async fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        spec: Option<&GitOpsSetGenerator>,
    ) -> Result<Vec<ParameterElement>, GeneratorError> {
        let spec = spec.ok_or(GeneratorError::EmptyOwningObject)?;
        let Some(git) = &spec.git_repository else {
            return Ok(Vec::new());
        };

        let namespace = ctx.namespace();
        let artifact = find_artifact(ctx, &namespace, &git.repository_ref).await?;
        info!(
            repository = %git.repository_ref,
            artifact.url = %artifact.url,
            "Generating params from GitRepository generator"
        );

        let scratch = ScratchDir::new("gitopssets-").map_err(GeneratorError::Scratch)?;
        ctx.fetcher
            .fetch(&artifact.url, &artifact.checksum, scratch.path())
            .await?;

        let mut elements = parse_files(scratch.path(), &git.files)?;
        elements.extend(match_directories(scratch.path(), &git.directories)?);
        Ok(elements)
    }

    fn interval(&self, _spec: &GitOpsSetGenerator) -> Option<Duration> {
        None
    }
}

async fn find_artifact(
    ctx: &GeneratorContext<'_>,
    namespace: &str,
    name: &str,
) -> Result<Artifact, GeneratorError> {
    let gvk = GroupVersionKind::gvk(GIT_REPOSITORY_GROUP, GIT_REPOSITORY_VERSION, "GitRepository");
    let repository = ctx
        .store
        .get(&gvk, Some(namespace), name)
        .await
        .map_err(|source| GeneratorError::Lookup {
            kind: "GitRepository".to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        })?
        .ok_or_else(|| GeneratorError::NotFound {
            kind: "GitRepository".to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

    let artifact = repository.data.pointer("/status/artifact");
    let field = |key: &str| {
        artifact
            .and_then(|a| a.get(key))
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    match (field("url"), field("digest").or_else(|| field("checksum"))) {
        (Some(url), Some(checksum)) => Ok(Artifact { url, checksum }),
        _ => Err(GeneratorError::NoArtifact {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }),
    }
}

/// One element per file
fn parse_files(
    root: &Path,
    files: &[GitRepositoryFileItem],
) -> Result<Vec<ParameterElement>, GeneratorError> {
    files
        .iter()
        .map(|file| {
            let full_path = resolve_within(root, &file.path)?;
            let contents =
                std::fs::read_to_string(&full_path).map_err(|e| GeneratorError::ReadFile {
                    path: file.path.clone(),
                    reason: e.to_string(),
                })?;
            let value: serde_json::Value =
                serde_yaml::from_str(&contents).map_err(|source| GeneratorError::ParseFile {
                    path: file.path.clone(),
                    source,
                })?;
            match value {
                serde_json::Value::Object(object) => Ok(ParameterElement::from_object(object)),
                serde_json::Value::Null => Ok(ParameterElement::new()),
                _ => Err(GeneratorError::NotAMapping {
                    path: file.path.clone(),
                }),
            }
        })
        .collect()
}

/// Compile a rule into a glob relative to the artifact root
fn compile_rule(root: &Path, rule: &str) -> Result<Pattern, GeneratorError> {
    let joined = secure_join(root, rule)?;
    let relative = joined
        .strip_prefix(root)
        .map(to_slash)
        .unwrap_or_default();
    Pattern::new(&relative).map_err(|e| GeneratorError::InvalidPattern {
        pattern: rule.to_string(),
        reason: e.to_string(),
    })
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Directories matched by the include rules and not by any exclude rule
fn match_directories(
    root: &Path,
    rules: &[GitRepositoryDirectoryItem],
) -> Result<Vec<ParameterElement>, GeneratorError> {
    if rules.is_empty() {
        return Ok(Vec::new());
    }

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let mut includes = Vec::new();
    let mut excludes = Vec::new();
    for rule in rules {
        let pattern = compile_rule(root, &rule.path)?;
        if rule.exclude {
            excludes.push(pattern);
        } else {
            includes.push(pattern);
        }
    }

    let mut directories: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(to_slash))
        .collect();
    directories.sort();

    let mut seen = HashSet::new();
    let mut elements = Vec::new();
    for include in &includes {
        for dir in directories.iter().filter(|d| include.matches_with(d, options)) {
            if excludes.iter().any(|e| e.matches_with(dir, options)) {
                debug!(directory = %dir, "Directory excluded");
                continue;
            }
            if !seen.insert(dir.clone()) {
                continue;
            }
            let base = dir.rsplit('/').next().unwrap_or(dir.as_str());
            let mut element = ParameterElement::new();
            element.insert("Directory", format!("./{dir}"));
            element.insert("Base", base);
            elements.push(element);
        }
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(dirs: &[&str]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for dir in dirs {
            std::fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        root
    }

    fn rule(path: &str, exclude: bool) -> GitRepositoryDirectoryItem {
        GitRepositoryDirectoryItem {
            path: path.to_string(),
            exclude,
        }
    }

    fn directories(elements: &[ParameterElement]) -> Vec<String> {
        elements
            .iter()
            .map(|e| e.get_json("Directory").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_directories_with_exclusion_before_include() {
        let root = tree(&["apps/dev", "apps/prod", "apps/staging", "infra/base"]);
        std::fs::write(root.path().join("apps/README.md"), "not a dir").unwrap();

        let elements = match_directories(
            root.path(),
            &[rule("apps/staging", true), rule("apps/*", false)],
        )
        .unwrap();

        assert_eq!(directories(&elements), vec!["./apps/dev", "./apps/prod"]);
        assert_eq!(elements[0].get_json("Base"), Some(&json!("dev")));
    }

    #[test]
    fn test_directories_are_deduplicated() {
        let root = tree(&["apps/dev"]);
        let elements = match_directories(
            root.path(),
            &[rule("apps/*", false), rule("./apps/dev", false)],
        )
        .unwrap();
        assert_eq!(directories(&elements), vec!["./apps/dev"]);
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        let root = tree(&["apps/dev/nested"]);
        let elements = match_directories(root.path(), &[rule("apps/*", false)]).unwrap();
        assert_eq!(directories(&elements), vec!["./apps/dev"]);
    }

    #[test]
    fn test_directory_rule_traversal_is_rejected() {
        let root = tree(&["apps"]);
        let err = match_directories(root.path(), &[rule("../*", false)]).unwrap_err();
        assert!(matches!(
            err,
            GeneratorError::Fetch(crate::controller::fetch::FetchError::PathEscape { .. })
        ));
    }

    #[test]
    fn test_files_parse_yaml_and_json() {
        let root = tree(&["clusters"]);
        std::fs::write(root.path().join("clusters/dev.yaml"), "env: dev\nreplicas: 2\n").unwrap();
        std::fs::write(root.path().join("clusters/prod.json"), r#"{"env": "prod"}"#).unwrap();

        let elements = parse_files(
            root.path(),
            &[
                GitRepositoryFileItem {
                    path: "clusters/dev.yaml".to_string(),
                },
                GitRepositoryFileItem {
                    path: "clusters/prod.json".to_string(),
                },
            ],
        )
        .unwrap();

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].get_json("replicas"), Some(&json!(2)));
        assert_eq!(elements[1].get_json("env"), Some(&json!("prod")));
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let root = tree(&[]);
        let err = parse_files(
            root.path(),
            &[GitRepositoryFileItem {
                path: "missing.yaml".to_string(),
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("\"missing.yaml\""));
    }

    #[test]
    fn test_unparseable_file_names_the_path() {
        let root = tree(&[]);
        std::fs::write(root.path().join("bad.yaml"), "env: [unclosed").unwrap();
        let err = parse_files(
            root.path(),
            &[GitRepositoryFileItem {
                path: "bad.yaml".to_string(),
            }],
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("failed to parse archive file \"bad.yaml\""));
    }

    #[test]
    fn test_file_traversal_is_rejected() {
        let root = tree(&[]);
        let err = parse_files(
            root.path(),
            &[GitRepositoryFileItem {
                path: "../../etc/passwd".to_string(),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, GeneratorError::Fetch(_)));
    }
}
