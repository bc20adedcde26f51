//! # Generator Tests
//!
//! Generators run through the reconciler's registry against the in-memory
//! store, with a local HTTP server standing in for APIClient endpoints.

mod common;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use common::{
    config_map, config_map_template, git_repository, gitopsset, reconciler, secret, selector,
    serve, stored,
};
use gitopssets_controller::prelude::*;
use kube::runtime::controller::Action;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

async fn generate(
    ctx: &Reconciler,
    gs: &GitOpsSet,
) -> Result<Vec<Vec<ParameterElement>>, GeneratorError> {
    let generator_ctx = ctx.generator_context(gs);
    ctx.generators
        .generate_all(&generator_ctx, &gs.spec.generators)
        .await
}

fn single(generator: GitOpsSetGenerator) -> GitOpsSet {
    gitopsset(vec![generator], vec![config_map_template("env")])
}

fn api_client(endpoint: String) -> APIClientGenerator {
    APIClientGenerator {
        endpoint,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_unset_variant_generates_nothing() {
    let ctx = reconciler(Arc::new(MemoryStore::new()));
    let gs = single(GitOpsSetGenerator::default());
    let registry = GeneratorRegistry::standard();
    let generator_ctx = ctx.generator_context(&gs);

    for kind in GeneratorKind::ALL {
        let generator = registry.get(kind).unwrap();
        let elements = generator
            .generate(&generator_ctx, Some(&GitOpsSetGenerator::default()))
            .await
            .unwrap();
        assert!(elements.is_empty(), "{kind} generated {elements:?}");
    }
}

#[tokio::test]
async fn test_missing_spec_is_rejected() {
    let ctx = reconciler(Arc::new(MemoryStore::new()));
    let gs = single(GitOpsSetGenerator::default());
    let registry = GeneratorRegistry::standard();
    let generator_ctx = ctx.generator_context(&gs);

    let err = registry
        .get(GeneratorKind::List)
        .unwrap()
        .generate(&generator_ctx, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GeneratorError::EmptyOwningObject));
}

#[tokio::test]
async fn test_config_requires_name_or_selector() {
    let ctx = reconciler(Arc::new(MemoryStore::new()));
    let gs = single(GitOpsSetGenerator {
        config: Some(ConfigGenerator {
            kind: "ConfigMap".to_string(),
            name: None,
            selector: None,
        }),
        ..Default::default()
    });

    let err = render_gitopsset(&ctx, &gs).await.unwrap_err();
    assert_eq!(err.to_string(), "name or labelSelector must be provided");
}

#[tokio::test]
async fn test_config_map_by_name_then_selector() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(config_map("named", json!({}), json!({"env": "named"})))
        .unwrap();
    store
        .insert(config_map("selected", json!({"team": "a"}), json!({"env": "selected"})))
        .unwrap();
    store
        .insert(config_map("ignored", json!({"team": "b"}), json!({"env": "ignored"})))
        .unwrap();
    let ctx = reconciler(store);
    let gs = single(GitOpsSetGenerator {
        config: Some(ConfigGenerator {
            kind: "ConfigMap".to_string(),
            name: Some("named".to_string()),
            selector: Some(selector(json!({"team": "a"}))),
        }),
        ..Default::default()
    });

    let lists = generate(&ctx, &gs).await.unwrap();
    let envs: Vec<Option<&Value>> = lists[0].iter().map(|e| e.get_json("env")).collect();
    assert_eq!(envs, vec![Some(&json!("named")), Some(&json!("selected"))]);
}

#[tokio::test]
async fn test_missing_named_config_map_is_an_error() {
    let ctx = reconciler(Arc::new(MemoryStore::new()));
    let gs = single(GitOpsSetGenerator {
        config: Some(ConfigGenerator {
            kind: "ConfigMap".to_string(),
            name: Some("absent".to_string()),
            selector: None,
        }),
        ..Default::default()
    });

    let err = generate(&ctx, &gs).await.unwrap_err();
    assert!(err.to_string().contains("demo/absent"), "{err}");
}

#[tokio::test]
async fn test_secret_values_render_decoded() {
    let store = Arc::new(MemoryStore::new());
    let encoded = base64::engine::general_purpose::STANDARD.encode("s3cr3t");
    store
        .insert(secret("creds", json!({"password": encoded})))
        .unwrap();
    let ctx = reconciler(store);
    let gs = gitopsset(
        vec![GitOpsSetGenerator {
            config: Some(ConfigGenerator {
                kind: "Secret".to_string(),
                name: Some("creds".to_string()),
                selector: None,
            }),
            ..Default::default()
        }],
        vec![json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "copied" },
            "data": { "password": "{{ .password }}" }
        })],
    );

    let rendered = render_gitopsset(&ctx, &gs).await.unwrap();
    assert_eq!(rendered[0].object.data["data"]["password"], json!("s3cr3t"));
}

#[tokio::test]
async fn test_unknown_config_kind_is_rejected() {
    let ctx = reconciler(Arc::new(MemoryStore::new()));
    let gs = single(GitOpsSetGenerator {
        config: Some(ConfigGenerator {
            kind: "Deployment".to_string(),
            name: Some("web".to_string()),
            selector: None,
        }),
        ..Default::default()
    });

    let err = generate(&ctx, &gs).await.unwrap_err();
    assert!(matches!(err, GeneratorError::UnknownConfigKind { .. }), "{err}");
}

#[tokio::test]
async fn test_git_repository_without_artifact() {
    let store = Arc::new(MemoryStore::new());
    store.insert(git_repository("infra", None)).unwrap();
    let ctx = reconciler(store);
    let gs = single(GitOpsSetGenerator {
        git_repository: Some(GitRepositoryGenerator {
            repository_ref: "infra".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    });

    let err = generate(&ctx, &gs).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "GitRepository demo/infra does not have an artifact"
    );
}

async fn authorized_clusters(headers: HeaderMap) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer abc123");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }
    Json(json!([{"env": "dev"}, {"env": "prod"}])).into_response()
}

async fn wrapped_items() -> Json<Value> {
    Json(json!({
        "items": [{"env": "dev"}],
        "meta": {"count": 1}
    }))
}

async fn echo_body(Json(body): Json<Value>) -> Json<Value> {
    Json(body)
}

async fn broken() -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, "x".repeat(2048))
}

fn api_router() -> Router {
    Router::new()
        .route("/clusters", get(authorized_clusters))
        .route("/wrapped", get(wrapped_items))
        .route("/echo", post(echo_body))
        .route("/broken", get(broken))
}

#[tokio::test]
async fn test_api_client_sends_headers_from_secret() {
    let base = serve(api_router()).await;
    let store = Arc::new(MemoryStore::new());
    let token = base64::engine::general_purpose::STANDARD.encode("Bearer abc123");
    store
        .insert(secret("api-token", json!({"Authorization": token})))
        .unwrap();
    let ctx = reconciler(store);
    let gs = single(GitOpsSetGenerator {
        api_client: Some(APIClientGenerator {
            headers_ref: Some(HeadersReference {
                kind: "Secret".to_string(),
                name: "api-token".to_string(),
            }),
            ..api_client(format!("{base}/clusters"))
        }),
        ..Default::default()
    });

    let rendered = render_gitopsset(&ctx, &gs).await.unwrap();
    let names: Vec<&str> = rendered.iter().map(|r| r.reference.name.as_str()).collect();
    assert_eq!(names, vec!["dev-config", "prod-config"]);
}

#[tokio::test]
async fn test_api_client_error_status_truncates_body() {
    let base = serve(api_router()).await;
    let ctx = reconciler(Arc::new(MemoryStore::new()));
    let gs = single(GitOpsSetGenerator {
        api_client: Some(api_client(format!("{base}/broken"))),
        ..Default::default()
    });

    let err = generate(&ctx, &gs).await.unwrap_err();
    match err {
        GeneratorError::HttpStatus { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body.len(), 512);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_api_client_json_path_selects_items() {
    let base = serve(api_router()).await;
    let ctx = reconciler(Arc::new(MemoryStore::new()));
    let gs = single(GitOpsSetGenerator {
        api_client: Some(APIClientGenerator {
            json_path: Some("{ .items }".to_string()),
            ..api_client(format!("{base}/wrapped"))
        }),
        ..Default::default()
    });

    let lists = generate(&ctx, &gs).await.unwrap();
    assert_eq!(lists[0].len(), 1);
    assert_eq!(lists[0][0].get_json("env"), Some(&json!("dev")));
}

#[tokio::test]
async fn test_api_client_json_path_errors_name_expression_and_endpoint() {
    let base = serve(api_router()).await;
    let ctx = reconciler(Arc::new(MemoryStore::new()));
    let endpoint = format!("{base}/wrapped");
    let gs = single(GitOpsSetGenerator {
        api_client: Some(APIClientGenerator {
            json_path: Some("$.meta".to_string()),
            ..api_client(endpoint.clone())
        }),
        ..Default::default()
    });

    let err = generate(&ctx, &gs).await.unwrap_err().to_string();
    assert_eq!(
        err,
        format!("JSONPath $.meta did not generate a suitable array accessing endpoint {endpoint}")
    );
}

#[tokio::test]
async fn test_api_client_body_is_posted_and_single_element() {
    let base = serve(api_router()).await;
    let ctx = reconciler(Arc::new(MemoryStore::new()));
    let gs = single(GitOpsSetGenerator {
        api_client: Some(APIClientGenerator {
            body: Some(json!({"env": "posted"})),
            single_element: true,
            ..api_client(format!("{base}/echo"))
        }),
        ..Default::default()
    });

    let lists = generate(&ctx, &gs).await.unwrap();
    assert_eq!(lists[0].len(), 1);
    assert_eq!(lists[0][0].get_json("env"), Some(&json!("posted")));
}

#[tokio::test]
async fn test_api_client_interval_requeues() {
    let base = serve(api_router()).await;
    let store = Arc::new(MemoryStore::new());
    let ctx = reconciler(store.clone());
    let spec = single(GitOpsSetGenerator {
        api_client: Some(APIClientGenerator {
            json_path: Some("$.items".to_string()),
            interval: "90s".to_string(),
            ..api_client(format!("{base}/wrapped"))
        }),
        ..Default::default()
    });

    let action = reconcile(stored(&store, &spec).await, ctx).await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(90)));
}

#[tokio::test]
async fn test_api_client_invalid_headers_kind() {
    let ctx = reconciler(Arc::new(MemoryStore::new()));
    let gs = single(GitOpsSetGenerator {
        api_client: Some(APIClientGenerator {
            headers_ref: Some(HeadersReference {
                kind: "Deployment".to_string(),
                name: "web".to_string(),
            }),
            ..api_client("http://127.0.0.1:1/unused".to_string())
        }),
        ..Default::default()
    });

    let err = generate(&ctx, &gs).await.unwrap_err();
    assert!(matches!(err, GeneratorError::UnsupportedHeadersKind(_)), "{err}");
    assert_eq!(err.class(), ErrorClass::Configuration);
}
