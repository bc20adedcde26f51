//! # List Generator
//!
//! One element per entry of `list.elements`.

use super::{Generator, GeneratorContext, GeneratorError, ParameterElement};
use crate::crd::GitOpsSetGenerator;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticList;

#[async_trait]
impl Generator for StaticList {
    async fn generate(
        &self,
        _ctx: &GeneratorContext<'_>,
        spec: Option<&GitOpsSetGenerator>,
    ) -> Result<Vec<ParameterElement>, GeneratorError> {
        let spec = spec.ok_or(GeneratorError::EmptyOwningObject)?;
        let Some(list) = &spec.list else {
            return Ok(Vec::new());
        };

        list.elements
            .iter()
            .enumerate()
            .map(|(index, value)| match value {
                serde_json::Value::Object(object) => Ok(ParameterElement::from_object(object.clone())),
                _ => Err(GeneratorError::InvalidListElement { index }),
            })
            .collect()
    }

    fn interval(&self, _spec: &GitOpsSetGenerator) -> Option<Duration> {
        None
    }
}
