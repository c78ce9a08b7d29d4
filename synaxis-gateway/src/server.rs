//! # HTTP Server
//!
//! Wires the `axum` router: config load, snapshot hot-reload task, shared
//! health/quota/usage state, middleware stack, and the OpenAI-compatible
//! route table.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use synaxis_core::health::HealthStore;
use synaxis_core::quota::QuotaTracker;
use synaxis_core::snapshot::SnapshotHandle;
use synaxis_core::usage::UsageRecorder;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use crate::auth::AuthService;
use crate::config::{self, Config};
use crate::handlers;
use crate::middleware::{
    auth_middleware, cors_middleware, input_validation_middleware, logging_middleware,
    metrics_middleware,
};

/// Shared across every handler and middleware invocation. Cheap to clone —
/// everything behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: SnapshotHandle,
    pub health: Arc<HealthStore>,
    pub quota: Arc<QuotaTracker>,
    pub usage: Arc<UsageRecorder>,
    pub auth: Arc<AuthService>,
    pub max_body_size: usize,
    pub request_deadline: Duration,
}

pub async fn create_server(cfg: Config) -> anyhow::Result<Router> {
    let snapshot = SnapshotHandle::new(cfg.to_snapshot()?);
    let health = Arc::new(HealthStore::new());
    let quota = Arc::new(QuotaTracker::new());
    let usage = Arc::new(UsageRecorder::new());
    let auth = Arc::new(AuthService::new(cfg.auth.clone()));

    if cfg.server.cors.enabled && cfg.server.cors.allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!(
            "CORS is enabled with wildcard origins; configure explicit allowed_origins for production"
        );
    }

    let state = AppState {
        snapshot: snapshot.clone(),
        health,
        quota,
        usage: usage.clone(),
        auth,
        max_body_size: cfg.server.max_body_size,
        request_deadline: cfg.server.timeout,
    };

    if let Ok(config_path) = std::env::var("SYNAXIS_CONFIG") {
        let reload_seconds = std::env::var("SYNAXIS_RELOAD_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(5);
        let handle = snapshot.clone();
        tokio::spawn(config::watch_and_reload(
            config_path,
            handle,
            Duration::from_secs(reload_seconds),
        ));
    }

    let sink = synaxis_core::usage::InMemoryUsageSink::default();
    let recorder = usage.clone();
    tokio::spawn(async move {
        recorder.run_drain_loop(&sink, Duration::from_secs(5)).await;
    });

    let app = Router::new()
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/models/{id}", get(handlers::get_model))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/completions", post(handlers::completions))
        .route("/v1/responses", post(handlers::responses))
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/health/liveness", get(handlers::liveness))
        .route("/health/readiness", get(handlers::readiness))
        .route("/metrics", get(handlers::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(cors_middleware(&cfg.server.cors))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    logging_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    input_validation_middleware,
                ))
                .layer(TimeoutLayer::new(cfg.server.timeout)),
        )
        .with_state(state);

    Ok(app)
}
