//! # Synaxis Gateway
//!
//! An OpenAI-compatible HTTP front door over [`synaxis_core`]: loads a
//! provider/model configuration, hot-reloads it from disk, and routes each
//! request through the cost- and quota-aware orchestrator to whichever
//! provider adapter can serve it.
//!
//! ## Architecture
//!
//! - **`config`**: TOML configuration loading, environment overrides, and
//!   the background hot-reload task.
//! - **`server`**: `axum` router assembly and shared [`AppState`](server::AppState).
//! - **`handlers`**: the OpenAI-compatible route handlers (chat completions,
//!   completions, responses, embeddings, model listing, health).
//! - **`middleware`**: request logging, metrics, authentication, CORS, and
//!   input validation layers.
//! - **`auth`**: static API-key identity resolution.
//! - **`request_context`**: per-request id/tenant/timing metadata threaded
//!   through the middleware stack.
//! - **`metrics`**: in-process request metrics and a Prometheus exposition
//!   format.
//! - **`error_handling`**: shared error-context plumbing for configuration
//!   validation.
//! - **`gateway_error`**: the HTTP-facing error type and its status mapping.
//!
//! ## Quick Start
//!
//! ```no_run
//! use synaxis_gateway::{create_server, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml")?;
//!     let app = create_server(config).await?;
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error_handling;
pub mod gateway_error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod request_context;
pub mod server;

pub use server::create_server;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use std::collections::HashMap;
    use std::time::Duration;
    use synaxis_core::providers::{ProviderConfig, RateLimit};

    fn provider_with_name(name: &str) -> ProviderConfig {
        let mut provider = ProviderConfig::new(name, "test-key");
        provider.base_url = Some("https://api.openai.com/v1".to_string());
        provider.timeout = Duration::from_secs(30);
        provider.max_retries = 3;
        provider.retry_delay = Duration::from_secs(1);
        provider.enabled = true;
        provider.model_mapping = HashMap::new();
        provider.headers = HashMap::new();
        provider.rate_limit = Some(RateLimit {
            requests_per_minute: 1000,
            tokens_per_minute: 100_000,
        });
        provider
    }

    #[tokio::test]
    async fn liveness_reports_ok() {
        let mut config = Config::default();
        config.providers.insert("openai".to_string(), provider_with_name("openai"));
        let app = create_server(config).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/health/liveness").await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_fails_with_no_enabled_providers() {
        let config = Config::default();
        let app = create_server(config).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/health/readiness").await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn list_models_reflects_configured_catalogue() {
        let mut config = Config::default();
        config.providers.insert("openai".to_string(), provider_with_name("openai"));
        let app = create_server(config).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/v1/models").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<serde_json::Value>();
        assert_eq!(body["object"], "list");
        assert!(body["data"].is_array());
    }

    #[tokio::test]
    async fn config_validation_rejects_zero_port() {
        let mut config = Config::default();
        config.providers.insert("test".to_string(), provider_with_name("test"));
        assert!(config.validate().is_ok());

        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn config_validation_rejects_zero_body_limit() {
        let mut config = Config::default();
        config.providers.insert("test".to_string(), provider_with_name("test"));
        config.server.max_body_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_parsing_covers_all_units() {
        assert_eq!(crate::config::parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(crate::config::parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(crate::config::parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(crate::config::parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert!(crate::config::parse_duration("").is_err());
        assert!(crate::config::parse_duration("30x").is_err());
        assert!(crate::config::parse_duration("abc").is_err());
    }

    #[test]
    fn environment_overrides_apply_log_level() {
        let mut config = Config::default();
        std::env::set_var("GATEWAY_LOG_LEVEL", "debug");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.logging.level, "debug");
        std::env::remove_var("GATEWAY_LOG_LEVEL");
    }
}
