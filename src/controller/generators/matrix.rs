//! # Matrix Generator
//!
//! Generates every nested entry and returns the cartesian product of their
//! elements.

use super::{Generator, GeneratorContext, GeneratorError, GeneratorRegistry, ParameterElement};
use crate::config::EmptyGeneratorsPolicy;
use crate::controller::combine::cartesian;
use crate::crd::{GitOpsSetGenerator, GitOpsSetNestedGenerator};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Matrix over a registry of non-matrix generators
#[derive(Debug, Clone)]
pub struct Matrix {
    nested: GeneratorRegistry,
}

impl Matrix {
    pub fn new(nested: GeneratorRegistry) -> Self {
        Self { nested }
    }

    fn nested_specs(nested: &[GitOpsSetNestedGenerator]) -> Vec<GitOpsSetGenerator> {
        nested.iter().map(GitOpsSetGenerator::from).collect()
    }
}

#[async_trait]
impl Generator for Matrix {
    async fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        spec: Option<&GitOpsSetGenerator>,
    ) -> Result<Vec<ParameterElement>, GeneratorError> {
        let spec = spec.ok_or(GeneratorError::EmptyOwningObject)?;
        let Some(matrix) = &spec.matrix else {
            return Ok(Vec::new());
        };

        info!(
            nested = matrix.generators.len(),
            "Generating params from Matrix generator"
        );
        let specs = Self::nested_specs(&matrix.generators);
        let lists = self.nested.generate_all(ctx, &specs).await?;
        Ok(cartesian(&lists, EmptyGeneratorsPolicy::NoElements))
    }

    fn interval(&self, spec: &GitOpsSetGenerator) -> Option<Duration> {
        spec.matrix
            .as_ref()
            .and_then(|matrix| self.nested.interval(&Self::nested_specs(&matrix.generators)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::generators::{ApiClient, StaticList};
    use crate::crd::{APIClientGenerator, GeneratorKind, ListGenerator, MatrixGenerator};
    use std::sync::Arc;

    #[test]
    fn test_interval_is_minimum_of_nested() {
        let registry = GeneratorRegistry::new()
            .with(GeneratorKind::List, Arc::new(StaticList))
            .with(GeneratorKind::APIClient, Arc::new(ApiClient));
        let matrix = Matrix::new(registry);

        let spec = GitOpsSetGenerator {
            matrix: Some(MatrixGenerator {
                generators: vec![
                    GitOpsSetNestedGenerator {
                        list: Some(ListGenerator::default()),
                        ..Default::default()
                    },
                    GitOpsSetNestedGenerator {
                        api_client: Some(APIClientGenerator {
                            endpoint: "http://example.com".to_string(),
                            interval: "30s".to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                ],
            }),
            ..Default::default()
        };

        assert_eq!(matrix.interval(&spec), Some(Duration::from_secs(30)));
        assert_eq!(matrix.interval(&GitOpsSetGenerator::default()), None);
    }
}
