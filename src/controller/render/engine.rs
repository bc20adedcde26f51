//! # Render Engine
//!
//! Expands every template once per combined element and turns the result
//! into resource manifests.
//!
//! Every string in the template content, keys included, is its own text
//! template. Rendered strings are spliced back into the structure, so a value
//! never has to survive a round trip through YAML quoting.

use super::error::{RenderError, TranslateError};
use super::functions;
use super::translate::{translate, Translated};
use crate::constants::{OWNER_NAME_LABEL, OWNER_NAMESPACE_LABEL};
use crate::controller::combine::{OwnerInfo, RenderContext};
use crate::controller::generators::ParameterElement;
use crate::crd::{GitOpsSet, ResourceRef};
use kube::core::DynamicObject;
use kube::ResourceExt;
use minijinja::{AutoEscape, Environment, ErrorKind, UndefinedBehavior};
use serde_json::{Map, Value};
use tracing::debug;

/// A parsed, fully rendered manifest
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResource {
    pub object: DynamicObject,
    pub reference: ResourceRef,
}

/// Template content with every action-bearing string translated up front
#[derive(Debug)]
enum Compiled {
    Literal(Value),
    Text(Translated),
    Array(Vec<Compiled>),
    Object(Vec<(Compiled, Compiled)>),
}

impl Compiled {
    fn new(value: &Value) -> Result<Self, TranslateError> {
        Ok(match value {
            Value::String(s) => Self::string(s)?,
            Value::Array(items) => {
                Self::Array(items.iter().map(Self::new).collect::<Result<_, _>>()?)
            }
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| Ok((Self::string(k)?, Self::new(v)?)))
                    .collect::<Result<_, TranslateError>>()?,
            ),
            other => Self::Literal(other.clone()),
        })
    }

    fn string(s: &str) -> Result<Self, TranslateError> {
        if s.contains("{{") {
            translate(s).map(Self::Text)
        } else {
            Ok(Self::Literal(Value::String(s.to_string())))
        }
    }
}

/// Template renderer with a fixed function set
#[derive(Debug)]
pub struct Renderer {
    env: Environment<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        functions::register(&mut env);
        Self { env }
    }

    /// Render every template for every element, template-major
    pub fn render(
        &self,
        gitopsset: &GitOpsSet,
        elements: &[ParameterElement],
    ) -> Result<Vec<RenderedResource>, RenderError> {
        let owner = OwnerInfo {
            name: gitopsset.name_any(),
            namespace: gitopsset.namespace().unwrap_or_else(|| "default".to_string()),
        };

        let mut rendered = Vec::with_capacity(gitopsset.spec.templates.len() * elements.len());
        for (index, template) in gitopsset.spec.templates.iter().enumerate() {
            let compiled = Compiled::new(&template.content)
                .map_err(|source| RenderError::Translate { index, source })?;

            for element in elements {
                let ctx = RenderContext::new(element, &owner);
                let value = self.expand(index, &compiled, ctx)?;
                rendered.push(into_resource(index, value, &owner)?);
            }
            debug!(template = index, elements = elements.len(), "Rendered template");
        }
        Ok(rendered)
    }

    fn expand(
        &self,
        index: usize,
        compiled: &Compiled,
        ctx: RenderContext<'_>,
    ) -> Result<Value, RenderError> {
        match compiled {
            Compiled::Literal(value) => Ok(value.clone()),
            Compiled::Text(text) => self.render_text(index, text, ctx).map(Value::String),
            Compiled::Array(items) => items
                .iter()
                .map(|item| self.expand(index, item, ctx))
                .collect::<Result<_, _>>()
                .map(Value::Array),
            Compiled::Object(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = match self.expand(index, key, ctx)? {
                        Value::String(key) => key,
                        other => other.to_string(),
                    };
                    map.insert(key, self.expand(index, value, ctx)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    fn render_text(
        &self,
        index: usize,
        text: &Translated,
        ctx: RenderContext<'_>,
    ) -> Result<String, RenderError> {
        self.env
            .render_str(&text.source, ctx)
            .map_err(|e| match e.kind() {
                ErrorKind::UndefinedError => RenderError::UndefinedField {
                    index,
                    field: first_undefined(&text.fields, &ctx)
                        .unwrap_or_else(|| e.detail().unwrap_or("value").to_string()),
                },
                ErrorKind::SyntaxError => RenderError::Compile {
                    index,
                    reason: e.to_string(),
                },
                _ => RenderError::Execute {
                    index,
                    reason: e.to_string(),
                },
            })
    }
}

/// First referenced field path that does not resolve in `ctx`
fn first_undefined(fields: &[Vec<String>], ctx: &RenderContext<'_>) -> Option<String> {
    let root = serde_json::to_value(ctx).ok()?;
    fields
        .iter()
        .find(|path| {
            path.iter()
                .try_fold(&root, |value, segment| value.get(segment.as_str()))
                .is_none()
        })
        .map(|path| format!(".{}", path.join(".")))
}

fn non_empty_str<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn into_resource(
    index: usize,
    mut value: Value,
    owner: &OwnerInfo,
) -> Result<RenderedResource, RenderError> {
    match &value {
        Value::Object(map) if map.is_empty() => return Err(RenderError::EmptyOutput { index }),
        Value::Object(_) => {}
        Value::Null => return Err(RenderError::EmptyOutput { index }),
        Value::String(s) if s.trim().is_empty() => return Err(RenderError::EmptyOutput { index }),
        _ => return Err(RenderError::NotAMapping { index }),
    }

    let api_version = non_empty_str(&value, "/apiVersion")
        .ok_or(RenderError::MissingField {
            index,
            field: "apiVersion",
        })?
        .to_string();
    let kind = non_empty_str(&value, "/kind")
        .ok_or(RenderError::MissingField { index, field: "kind" })?
        .to_string();
    let name = non_empty_str(&value, "/metadata/name")
        .ok_or(RenderError::MissingField {
            index,
            field: "metadata.name",
        })?
        .to_string();

    let metadata = value
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or(RenderError::MissingField {
            index,
            field: "metadata",
        })?;
    let namespace = match metadata.get("namespace").and_then(Value::as_str) {
        Some(ns) if !ns.is_empty() => ns.to_string(),
        _ => {
            metadata.insert("namespace".to_string(), Value::String(owner.namespace.clone()));
            owner.namespace.clone()
        }
    };
    let labels = metadata
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()));
    if !labels.is_object() {
        *labels = Value::Object(Map::new());
    }
    if let Some(labels) = labels.as_object_mut() {
        labels.insert(OWNER_NAME_LABEL.to_string(), Value::String(owner.name.clone()));
        labels.insert(
            OWNER_NAMESPACE_LABEL.to_string(),
            Value::String(owner.namespace.clone()),
        );
    }

    let (group, version) = match api_version.rsplit_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.clone()),
    };
    let object: DynamicObject = serde_json::from_value(value)
        .map_err(|source| RenderError::InvalidObject { index, source })?;

    Ok(RenderedResource {
        object,
        reference: ResourceRef {
            group,
            version,
            kind,
            namespace: Some(namespace),
            name,
        },
    })
}
