//! End-to-end coverage of the OpenAI-compatible route surface, running the
//! real router against a mocked upstream provider.

use axum_test::TestServer;
use serde_json::json;
use synaxis_core::providers::ProviderConfig;
use synaxis_core::snapshot::{Capability, CanonicalModel};
use synaxis_gateway::config::{ApiKeyConfig, Config, CostEntry};
use synaxis_gateway::create_server;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_openai_provider() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello there."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        })))
        .mount(&server)
        .await;
    server
}

fn base_config(upstream_url: &str) -> Config {
    let mut config = Config::default();

    let mut provider = ProviderConfig::new("openai", "test-key");
    provider.base_url = Some(upstream_url.to_string());
    provider.enabled = true;
    config.providers.insert("openai".to_string(), provider);

    config.canonical_models.push(CanonicalModel {
        id: "gpt-4o-mini".to_string(),
        provider: "openai".to_string(),
        model_path: "gpt-4o-mini".to_string(),
        capabilities: vec![Capability::Streaming, Capability::Tools],
        aliases: vec!["gpt4o-mini".to_string()],
    });

    config.costs.push(CostEntry {
        provider: "openai".to_string(),
        canonical_id: "gpt-4o-mini".to_string(),
        cost: synaxis_core::snapshot::ModelCost {
            input_cost_per_token: 0.0,
            output_cost_per_token: 0.0,
            free_tier: true,
        },
    });

    config
}

async fn test_server(upstream_url: &str) -> TestServer {
    let config = base_config(upstream_url);
    let app = create_server(config).await.unwrap();
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn liveness_always_ok() {
    let upstream = mock_openai_provider().await;
    let server = test_server(&upstream.uri()).await;
    let response = server.get("/health/liveness").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn readiness_ok_with_enabled_provider() {
    let upstream = mock_openai_provider().await;
    let server = test_server(&upstream.uri()).await;
    let response = server.get("/health/readiness").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn list_models_reports_configured_catalogue() {
    let upstream = mock_openai_provider().await;
    let server = test_server(&upstream.uri()).await;
    let response = server.get("/v1/models").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["object"], "list");
    let ids: Vec<String> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&"gpt-4o-mini".to_string()));
}

#[tokio::test]
async fn get_model_404s_for_unknown_id() {
    let upstream = mock_openai_provider().await;
    let server = test_server(&upstream.uri()).await;
    let response = server.get("/v1/models/does-not-exist").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn chat_completions_round_trips_through_mocked_provider() {
    let upstream = mock_openai_provider().await;
    let server = test_server(&upstream.uri()).await;

    let request = json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "Hello"}],
        "stream": false
    });

    let response = server.post("/v1/chat/completions").json(&request).await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello there.");
    assert!(response.headers().get("x-synaxis-provider").is_some());
}

#[tokio::test]
async fn chat_completions_resolves_aliases() {
    let upstream = mock_openai_provider().await;
    let server = test_server(&upstream.uri()).await;

    let request = json!({
        "model": "gpt4o-mini",
        "messages": [{"role": "user", "content": "Hello"}],
    });

    let response = server.post("/v1/chat/completions").json(&request).await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn chat_completions_rejects_empty_messages() {
    let upstream = mock_openai_provider().await;
    let server = test_server(&upstream.uri()).await;

    let request = json!({ "model": "gpt-4o-mini", "messages": [] });
    let response = server.post("/v1/chat/completions").json(&request).await;
    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn chat_completions_404s_for_unknown_model() {
    let upstream = mock_openai_provider().await;
    let server = test_server(&upstream.uri()).await;

    let request = json!({
        "model": "not-a-real-model",
        "messages": [{"role": "user", "content": "Hello"}],
    });
    let response = server.post("/v1/chat/completions").json(&request).await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn auth_enabled_rejects_missing_api_key() {
    let upstream = mock_openai_provider().await;
    let mut config = base_config(&upstream.uri());
    config.auth.enabled = true;
    config.auth.api_keys.push(ApiKeyConfig {
        key: "sk-test-key".to_string(),
        name: "test tenant".to_string(),
        enabled: true,
        tenant_id: "tenant-a".to_string(),
        user_id: None,
        allowed_models: None,
    });

    let app = create_server(config).await.unwrap();
    let server = TestServer::new(app).unwrap();

    let request = json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "Hello"}],
    });
    let response = server.post("/v1/chat/completions").json(&request).await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn auth_enabled_accepts_valid_api_key() {
    let upstream = mock_openai_provider().await;
    let mut config = base_config(&upstream.uri());
    config.auth.enabled = true;
    config.auth.api_keys.push(ApiKeyConfig {
        key: "sk-test-key".to_string(),
        name: "test tenant".to_string(),
        enabled: true,
        tenant_id: "tenant-a".to_string(),
        user_id: None,
        allowed_models: None,
    });

    let app = create_server(config).await.unwrap();
    let server = TestServer::new(app).unwrap();

    let request = json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "Hello"}],
    });
    let response = server
        .post("/v1/chat/completions")
        .add_header("Authorization", "Bearer sk-test-key")
        .json(&request)
        .await;
    assert_eq!(response.status_code(), 200);
}
