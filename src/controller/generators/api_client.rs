//! # APIClient Generator
//!
//! Calls an HTTP endpoint and turns the JSON response into elements.
//!
//! ## Response modes
//!
//! - default: the body is an array of objects, one element each
//! - `singleElement`: the body is a single object, one element
//! - `jsonPath`: the expression must select exactly one value, which must be
//!   an array of objects
//!
//! JSONPath expressions may be written Kubernetes style (`{ .items }`) or in
//! RFC 9535 form (`$.items`).

use super::config::{config_map_string_data, secret_string_data};
use super::{Generator, GeneratorContext, GeneratorError, ParameterElement};
use crate::controller::duration::parse_duration;
use crate::crd::{APIClientGenerator, GitOpsSetGenerator};
use async_trait::async_trait;
use jsonpath_rust::JsonPath;
use kube::core::GroupVersionKind;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Longest response body quoted in an error
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, Default)]
pub struct ApiClient;

#[async_trait]
impl Generator for ApiClient {
    async fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        spec: Option<&GitOpsSetGenerator>,
    ) -> Result<Vec<ParameterElement>, GeneratorError> {
        let spec = spec.ok_or(GeneratorError::EmptyOwningObject)?;
        let Some(api) = &spec.api_client else {
            return Ok(Vec::new());
        };

        parse_duration(&api.interval).map_err(|e| GeneratorError::InvalidInterval {
            value: api.interval.clone(),
            reason: e.to_string(),
        })?;

        info!(endpoint = %api.endpoint, "Generating params from APIClient generator");

        let request = build_request(ctx, api).await?;
        let response = request.send().await.map_err(|source| GeneratorError::Http {
            endpoint: api.endpoint.clone(),
            source,
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|source| GeneratorError::Http {
            endpoint: api.endpoint.clone(),
            source,
        })?;

        if status.as_u16() >= 400 {
            let text: String = String::from_utf8_lossy(&body)
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();
            warn!(endpoint = %api.endpoint, status = status.as_u16(), "Endpoint returned an error");
            return Err(GeneratorError::HttpStatus {
                endpoint: api.endpoint.clone(),
                status: status.as_u16(),
                body: text,
            });
        }

        let decode_error = |e: serde_json::Error| GeneratorError::Decode {
            endpoint: api.endpoint.clone(),
            reason: e.to_string(),
        };

        match api.json_path.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(expression) => {
                let value: Value = serde_json::from_slice(&body).map_err(decode_error)?;
                elements_from_json_path(&value, expression, &api.endpoint)
            }
            None if api.single_element => {
                let object: serde_json::Map<String, Value> =
                    serde_json::from_slice(&body).map_err(decode_error)?;
                Ok(vec![ParameterElement::from_object(object)])
            }
            None => {
                let objects: Vec<serde_json::Map<String, Value>> =
                    serde_json::from_slice(&body).map_err(decode_error)?;
                Ok(objects.into_iter().map(ParameterElement::from_object).collect())
            }
        }
    }

    fn interval(&self, spec: &GitOpsSetGenerator) -> Option<Duration> {
        spec.api_client
            .as_ref()
            .and_then(|api| parse_duration(&api.interval).ok())
    }
}

async fn build_request(
    ctx: &GeneratorContext<'_>,
    api: &APIClientGenerator,
) -> Result<reqwest::RequestBuilder, GeneratorError> {
    let url = reqwest::Url::parse(&api.endpoint).map_err(|e| GeneratorError::InvalidEndpoint {
        endpoint: api.endpoint.clone(),
        reason: e.to_string(),
    })?;

    let method = if api.body.is_some() {
        reqwest::Method::POST
    } else {
        reqwest::Method::from_bytes(api.method.to_uppercase().as_bytes())
            .map_err(|_| GeneratorError::InvalidMethod(api.method.clone()))?
    };

    let mut request = ctx.http.request(method, url);
    if let Some(body) = &api.body {
        // Sets Content-Type: application/json
        request = request.json(body);
    }
    if let Some(headers_ref) = &api.headers_ref {
        request = request.headers(load_headers(ctx, &headers_ref.kind, &headers_ref.name).await?);
    }
    Ok(request)
}

/// Headers from a ConfigMap or Secret in the owning namespace
async fn load_headers(
    ctx: &GeneratorContext<'_>,
    kind: &str,
    name: &str,
) -> Result<HeaderMap, GeneratorError> {
    let gvk = match kind {
        "ConfigMap" | "Secret" => GroupVersionKind::gvk("", "v1", kind),
        other => return Err(GeneratorError::UnsupportedHeadersKind(other.to_string())),
    };
    let namespace = ctx.namespace();
    let obj = ctx
        .store
        .get(&gvk, Some(&namespace), name)
        .await
        .map_err(|source| GeneratorError::Lookup {
            kind: kind.to_string(),
            namespace: namespace.clone(),
            name: name.to_string(),
            source,
        })?
        .ok_or_else(|| GeneratorError::NotFound {
            kind: kind.to_string(),
            namespace: namespace.clone(),
            name: name.to_string(),
        })?;

    let pairs = if kind == "Secret" {
        secret_string_data(&obj)?
    } else {
        config_map_string_data(&obj)
    };

    let mut headers = HeaderMap::new();
    for (key, value) in pairs {
        let invalid = || GeneratorError::InvalidHeader {
            name: key.clone(),
            kind: kind.to_string(),
            source_name: name.to_string(),
        };
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(&value).map_err(|_| invalid())?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// Rewrite Kubernetes-style `{ .items }` into RFC 9535 `$.items`
pub(crate) fn normalize_json_path(expression: &str) -> String {
    let trimmed = expression.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .map_or(trimmed, str::trim);

    if inner.starts_with('$') {
        inner.to_string()
    } else if inner.starts_with('.') || inner.starts_with('[') {
        format!("${inner}")
    } else {
        format!("$.{inner}")
    }
}

fn elements_from_json_path(
    value: &Value,
    expression: &str,
    endpoint: &str,
) -> Result<Vec<ParameterElement>, GeneratorError> {
    let nodes: Vec<&Value> = value.query(&normalize_json_path(expression)).map_err(|e| {
        GeneratorError::InvalidJsonPath {
            expression: expression.to_string(),
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    })?;

    let [selected] = nodes.as_slice() else {
        return Err(GeneratorError::JsonPathResultCount {
            count: nodes.len(),
            expression: expression.to_string(),
            endpoint: endpoint.to_string(),
        });
    };

    let items = selected
        .as_array()
        .ok_or_else(|| GeneratorError::JsonPathNotArray {
            expression: expression.to_string(),
            endpoint: endpoint.to_string(),
        })?;

    items
        .iter()
        .map(|item| match item {
            Value::Object(object) => Ok(ParameterElement::from_object(object.clone())),
            _ => Err(GeneratorError::JsonPathNotObjects {
                expression: expression.to_string(),
                endpoint: endpoint.to_string(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_json_path() {
        assert_eq!(normalize_json_path("{ .items }"), "$.items");
        assert_eq!(normalize_json_path("{.data.clusters}"), "$.data.clusters");
        assert_eq!(normalize_json_path("$.items"), "$.items");
        assert_eq!(normalize_json_path("items"), "$.items");
        assert_eq!(normalize_json_path("{['items']}"), "$['items']");
    }

    #[test]
    fn test_json_path_selects_array_of_objects() {
        let body = json!({"items": [{"env": "dev"}, {"env": "prod"}]});
        let elements = elements_from_json_path(&body, "{ .items }", "http://api").unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].get_json("env"), Some(&json!("prod")));
    }

    #[test]
    fn test_json_path_must_match_exactly_once() {
        let body = json!({"items": [{"env": "dev"}, {"env": "prod"}]});
        let err = elements_from_json_path(&body, "$.items[*]", "http://api").unwrap_err();
        assert_eq!(
            err.to_string(),
            "2 results found with expression $.items[*] accessing endpoint http://api"
        );

        let err = elements_from_json_path(&body, "$.missing", "http://api").unwrap_err();
        assert!(matches!(err, GeneratorError::JsonPathResultCount { count: 0, .. }));
    }

    #[test]
    fn test_json_path_rejects_non_array_and_non_objects() {
        let body = json!({"one": {"env": "dev"}, "names": ["a", "b"]});

        let err = elements_from_json_path(&body, "$.one", "http://api").unwrap_err();
        assert!(matches!(err, GeneratorError::JsonPathNotArray { .. }));
        assert!(err.to_string().contains("$.one"));
        assert!(err.to_string().contains("http://api"));

        let err = elements_from_json_path(&body, "$.names", "http://api").unwrap_err();
        assert!(matches!(err, GeneratorError::JsonPathNotObjects { .. }));
    }

    #[test]
    fn test_invalid_json_path_names_expression() {
        let err = elements_from_json_path(&json!({}), "$[?", "http://api").unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidJsonPath { .. }));
        assert!(err.to_string().contains("\"$[?\""));
    }

    #[test]
    fn test_interval_parsing() {
        let spec = GitOpsSetGenerator {
            api_client: Some(APIClientGenerator {
                endpoint: "http://api".to_string(),
                interval: "1m30s".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(ApiClient.interval(&spec), Some(Duration::from_secs(90)));
    }
}
