//! # Config Generator
//!
//! One element per ConfigMap or Secret: the named object first (if any), then
//! every object matching the selector. ConfigMap values are strings, Secret
//! values are the decoded bytes.

use super::{parse_selector, Generator, GeneratorContext, GeneratorError, ParamValue, ParameterElement};
use crate::crd::GitOpsSetGenerator;
use async_trait::async_trait;
use base64::Engine;
use kube::core::{DynamicObject, GroupVersionKind};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigObjects;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigKind {
    ConfigMap,
    Secret,
}

impl ConfigKind {
    fn gvk(self) -> GroupVersionKind {
        match self {
            Self::ConfigMap => GroupVersionKind::gvk("", "v1", "ConfigMap"),
            Self::Secret => GroupVersionKind::gvk("", "v1", "Secret"),
        }
    }
}

#[async_trait]
impl Generator for ConfigObjects {
    async fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        spec: Option<&GitOpsSetGenerator>,
    ) -> Result<Vec<ParameterElement>, GeneratorError> {
        let spec = spec.ok_or(GeneratorError::EmptyOwningObject)?;
        let Some(config) = &spec.config else {
            return Ok(Vec::new());
        };

        let name = config.name.clone().unwrap_or_default();
        if config.selector.is_none() && name.is_empty() {
            return Err(GeneratorError::MissingConfigSource);
        }
        let selector = config.selector.as_ref().map(parse_selector).transpose()?;

        let kind = match config.kind.as_str() {
            "ConfigMap" => ConfigKind::ConfigMap,
            "Secret" => ConfigKind::Secret,
            other => {
                return Err(GeneratorError::UnknownConfigKind {
                    kind: other.to_string(),
                    name,
                })
            }
        };

        info!(kind = %config.kind, name = %name, "Generating params from Config generator");

        let namespace = ctx.namespace();
        let gvk = kind.gvk();
        let mut objects = Vec::new();

        if !name.is_empty() {
            let obj = ctx
                .store
                .get(&gvk, Some(&namespace), &name)
                .await
                .map_err(|source| GeneratorError::Lookup {
                    kind: config.kind.clone(),
                    namespace: namespace.clone(),
                    name: name.clone(),
                    source,
                })?
                .ok_or_else(|| GeneratorError::NotFound {
                    kind: config.kind.clone(),
                    namespace: namespace.clone(),
                    name: name.clone(),
                })?;
            objects.push(obj);
        }

        // An absent selector lists nothing
        if let Some(selector) = &selector {
            let listed = ctx
                .store
                .list(&gvk, Some(&namespace), selector)
                .await
                .map_err(|source| GeneratorError::Lookup {
                    kind: config.kind.clone(),
                    namespace: namespace.clone(),
                    name: selector.to_string(),
                    source,
                })?;
            objects.extend(listed);
        }

        objects
            .iter()
            .map(|obj| match kind {
                ConfigKind::ConfigMap => Ok(config_map_params(obj)),
                ConfigKind::Secret => secret_params(obj),
            })
            .collect()
    }

    fn interval(&self, _spec: &GitOpsSetGenerator) -> Option<Duration> {
        None
    }
}

fn config_map_params(obj: &DynamicObject) -> ParameterElement {
    obj.data
        .get("data")
        .and_then(serde_json::Value::as_object)
        .map(|data| ParameterElement::from_object(data.clone()))
        .unwrap_or_default()
}

fn secret_params(obj: &DynamicObject) -> Result<ParameterElement, GeneratorError> {
    let Some(data) = obj.data.get("data").and_then(serde_json::Value::as_object) else {
        return Ok(ParameterElement::new());
    };
    let secret_name = obj.metadata.name.clone().unwrap_or_default();

    data.iter()
        .map(|(key, value)| {
            let encoded = value.as_str().unwrap_or_default();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| GeneratorError::InvalidSecretData {
                    name: secret_name.clone(),
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            Ok((key.clone(), ParamValue::Bytes(bytes)))
        })
        .collect()
}

/// Secret data decoded to text, for consumers that need strings (HTTP headers)
pub(crate) fn secret_string_data(obj: &DynamicObject) -> Result<Vec<(String, String)>, GeneratorError> {
    Ok(secret_params(obj)?.iter().map(as_text).collect())
}

/// ConfigMap data as string pairs
pub(crate) fn config_map_string_data(obj: &DynamicObject) -> Vec<(String, String)> {
    config_map_params(obj).iter().map(as_text).collect()
}

fn as_text((key, value): (&String, &ParamValue)) -> (String, String) {
    let text = match value {
        ParamValue::Json(serde_json::Value::String(s)) => s.clone(),
        ParamValue::Json(other) => other.to_string(),
        ParamValue::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    };
    (key.clone(), text)
}
