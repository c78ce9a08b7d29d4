//! # HTTP Middleware
//!
//! CORS, request logging, metrics, and authentication, applied in that
//! order around every route except the health endpoints.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::http::{self, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;
use crate::server::AppState;

pub mod input_validation;

pub use input_validation::input_validation_middleware;

pub async fn logging_middleware(
    State(_state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let request_id = req
        .extensions()
        .get::<crate::request_context::RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status,
        latency_ms = latency.as_millis(),
        "request processed"
    );

    response
}

pub async fn metrics_middleware(
    State(_state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;
    let latency = start.elapsed();
    let status = response.status();

    let should_record = !uri.path().starts_with("/health") && uri.path() != "/metrics";
    if should_record {
        let mut builder = crate::metrics::RequestMetricsBuilder::new(
            method.to_string(),
            uri.path().to_string(),
            status.as_u16(),
            latency,
        );
        if let Some(provider) = response
            .headers()
            .get(crate::handlers::PROVIDER_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            builder = builder.provider(provider.to_string());
        }
        if let Some(model) = response
            .headers()
            .get(crate::handlers::RESOLVED_MODEL_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            builder = builder.model(model.to_string());
        }
        crate::metrics::record_request(builder.build()).await;
    }

    response
}

fn unauthorized(message: &str) -> Response {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header("Content-Type", "application/json")
        .body(Body::from(format!(
            r#"{{"error": {{"message": "{message}", "type": "Auth"}}}}"#
        )))
        .expect("well-formed response")
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() == http::Method::OPTIONS {
        return next.run(req).await;
    }

    if !state.auth.enabled() {
        req.extensions_mut()
            .insert(crate::request_context::RequestContext::new());
        return next.run(req).await;
    }

    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let api_key = match crate::auth::AuthService::extract_api_key_from_header(auth_header) {
        Some(key) => key,
        None => return unauthorized("missing Authorization header"),
    };

    let auth_context = match state.auth.validate_api_key(&api_key) {
        Ok(ctx) => ctx,
        Err(e) => return unauthorized(&e.to_string()),
    };

    let request_context = crate::request_context::RequestContext::with_auth(&auth_context);
    req.extensions_mut().insert(request_context);
    req.extensions_mut().insert(auth_context);

    next.run(req).await
}

pub fn cors_middleware(cors_config: &CorsConfig) -> CorsLayer {
    if !cors_config.enabled {
        return CorsLayer::new();
    }

    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        for origin in &cors_config.allowed_origins {
            if let Ok(origin) = origin.parse::<http::header::HeaderValue>() {
                cors = cors.allow_origin(origin);
            }
        }
    }

    cors = cors.allow_methods(Any).allow_headers(Any);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(max_age);
    }

    cors
}
