//! # HTTP Request Handlers
//!
//! The OpenAI-compatible surface: resolve a requested model against the
//! current snapshot, hand the enriched candidate list to the orchestrator,
//! and translate whatever comes back into the wire shape callers expect.
//! `chat_completions`, `completions`, and `responses` share one canonical
//! request/response schema (see [`synaxis_core::models::ChatRequest`]) and
//! differ only in which [`EndpointKind`] they tag the request with —
//! that's what drives resolver capability filtering, not a different body
//! shape.

use std::collections::HashMap;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use futures::StreamExt;
use serde_json::json;

use synaxis_core::error::ProviderError;
use synaxis_core::models::{ChatRequest, ChatResponse, EmbeddingRequest, EndpointKind};
use synaxis_core::orchestrator::{AttemptError, AttemptErrorKind, EnrichedCandidate, Orchestrator};
use synaxis_core::providers::create_provider;
use synaxis_core::resolver::{self, ResolvedCandidates};
use synaxis_core::snapshot::{Capability, GatewaySnapshot};
use synaxis_core::translation::{translate_chunk, StreamState, ToolCallAccumulator};
use synaxis_core::usage::UsageRecord;

use crate::auth::AuthContext;
use crate::gateway_error::GatewayError;
use crate::request_context::RequestContext;
use crate::server::AppState;

pub(crate) const PROVIDER_HEADER: &str = "x-synaxis-provider";
pub(crate) const RESOLVED_MODEL_HEADER: &str = "x-synaxis-resolved-model";

fn classify_provider_error(err: &ProviderError) -> AttemptErrorKind {
    match err {
        ProviderError::InvalidApiKey | ProviderError::AuthenticationFailed { .. } => {
            AttemptErrorKind::Auth
        }
        ProviderError::ModelNotFound { .. } => AttemptErrorKind::ModelNotFound,
        ProviderError::RateLimit | ProviderError::QuotaExceeded => AttemptErrorKind::RateLimit,
        ProviderError::ServiceUnavailable | ProviderError::Timeout | ProviderError::Http(_) => {
            AttemptErrorKind::ProviderUnavailable
        }
        ProviderError::ValidationError { .. } => AttemptErrorKind::Validation,
        ProviderError::Api { code, .. } => match *code {
            400 => AttemptErrorKind::Validation,
            401 | 403 => AttemptErrorKind::Auth,
            429 => AttemptErrorKind::RateLimit,
            500..=599 => AttemptErrorKind::ProviderUnavailable,
            _ => AttemptErrorKind::ProviderError,
        },
        _ => AttemptErrorKind::ProviderError,
    }
}

fn attempt_error(err: ProviderError) -> AttemptError {
    AttemptError {
        kind: classify_provider_error(&err),
        message: err.to_string(),
    }
}

fn required_capabilities(request: &ChatRequest, endpoint: EndpointKind) -> Vec<Capability> {
    let mut caps = Vec::new();
    if endpoint == EndpointKind::Embeddings {
        caps.push(Capability::Embeddings);
        return caps;
    }
    if request.stream.unwrap_or(false) {
        caps.push(Capability::Streaming);
    }
    if request.tools.is_some() {
        caps.push(Capability::Tools);
    }
    caps
}

fn model_paths_for(snapshot: &GatewaySnapshot, canonical_id: &str) -> HashMap<String, String> {
    snapshot
        .canonical_models
        .iter()
        .filter(|m| m.id == canonical_id)
        .map(|m| (m.provider.clone(), m.model_path.clone()))
        .collect()
}

fn enrich_candidates(snapshot: &GatewaySnapshot, resolved: ResolvedCandidates) -> Vec<EnrichedCandidate> {
    let paths = model_paths_for(snapshot, &resolved.canonical_id);
    resolved
        .providers
        .into_iter()
        .map(|provider| {
            let resolved_model_path = paths
                .get(&provider.name)
                .cloned()
                .unwrap_or_else(|| resolved.canonical_id.clone());
            EnrichedCandidate::new(provider, resolved.canonical_id.clone(), resolved_model_path, &snapshot.costs)
        })
        .collect()
}

fn check_allowed_model(auth: Option<&AuthContext>, model: &str) -> Result<(), GatewayError> {
    if let Some(ctx) = auth {
        if let Some(allowed) = &ctx.allowed_models {
            if !allowed.iter().any(|m| m == model) {
                return Err(GatewayError::Auth {
                    message: format!("model {model} is not permitted for this API key"),
                });
            }
        }
    }
    Ok(())
}

fn cost_cents_for(candidates: &[EnrichedCandidate], provider_key: &str, output_tokens: u32) -> f64 {
    candidates
        .iter()
        .find(|c| c.provider.name == provider_key)
        .map(|c| {
            if c.cost_per_token.is_finite() {
                c.cost_per_token * output_tokens as f64 * 100.0
            } else {
                0.0
            }
        })
        .unwrap_or(0.0)
}

fn usage_record(
    ctx: &RequestContext,
    requested_model: &str,
    resolved_provider: &str,
    resolved_model: &str,
    input_tokens: u32,
    output_tokens: u32,
    cost_cents: f64,
    success: bool,
    error_kind: Option<String>,
) -> UsageRecord {
    UsageRecord {
        request_id: ctx.request_id.clone(),
        tenant_id: ctx.tenant_id.clone().unwrap_or_default(),
        user_id: ctx.user_id.clone(),
        api_key_id: ctx.api_key_id.clone(),
        requested_model: requested_model.to_string(),
        resolved_provider: resolved_provider.to_string(),
        resolved_model: resolved_model.to_string(),
        input_tokens,
        output_tokens,
        cost_cents,
        started_at: Utc::now() - chrono::Duration::milliseconds(ctx.duration().as_millis() as i64),
        duration_ms: ctx.duration().as_millis() as u64,
        success,
        error_kind,
    }
}

async fn dispatch_unary(
    state: &AppState,
    ctx: &RequestContext,
    auth: Option<&AuthContext>,
    endpoint: EndpointKind,
    request: ChatRequest,
) -> Result<Response, GatewayError> {
    let requested_model = request.model.clone();
    check_allowed_model(auth, &requested_model)?;

    let snapshot = state.snapshot.current();
    let caps = required_capabilities(&request, endpoint);
    let resolved = resolver::resolve(&snapshot, &requested_model, endpoint, &caps)?;
    let candidates = enrich_candidates(&snapshot, resolved);
    let policy = snapshot
        .policy_for(ctx.tenant_id.as_deref(), ctx.user_id.as_deref())
        .clone();

    let outcome = Orchestrator::run(
        &state.health,
        &state.quota,
        candidates.clone(),
        &policy,
        &[],
        Some(state.request_deadline),
        |provider_config| {
            let mut request = request.clone();
            request.model = provider_config
                .model_mapping
                .get(&requested_model)
                .cloned()
                .unwrap_or_else(|| requested_model.clone());
            async move {
                let provider = create_provider(provider_config).map_err(attempt_error)?;
                provider.chat_completion(request).await.map_err(attempt_error)
            }
        },
    )
    .await;

    match outcome {
        Ok((response, provider_key)) => {
            let (input_tokens, output_tokens) = response
                .usage
                .as_ref()
                .map(|u| (u.prompt_tokens, u.completion_tokens))
                .unwrap_or((0, 0));
            state
                .quota
                .record_usage(&provider_key, input_tokens as u64, output_tokens as u64);
            let cost_cents = cost_cents_for(&candidates, &provider_key, output_tokens);
            state.usage.record_usage(usage_record(
                ctx,
                &requested_model,
                &provider_key,
                &response.model,
                input_tokens,
                output_tokens,
                cost_cents,
                true,
                None,
            ));

            let mut resp = Json(response).into_response();
            insert_header(&mut resp, PROVIDER_HEADER, &provider_key);
            insert_header(&mut resp, RESOLVED_MODEL_HEADER, &requested_model);
            Ok(resp)
        }
        Err(orchestration_err) => {
            let error: GatewayError = orchestration_err.into();
            state.usage.record_usage(usage_record(
                ctx,
                &requested_model,
                "",
                "",
                0,
                0,
                0.0,
                false,
                Some(error.to_string()),
            ));
            Err(error)
        }
    }
}

fn insert_header(resp: &mut Response, name: &str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        resp.headers_mut().insert(name, value);
    }
}

async fn dispatch_stream(
    state: &AppState,
    ctx: &RequestContext,
    auth: Option<&AuthContext>,
    endpoint: EndpointKind,
    mut request: ChatRequest,
) -> Result<Response, GatewayError> {
    let requested_model = request.model.clone();
    check_allowed_model(auth, &requested_model)?;
    request.stream = Some(true);

    let snapshot = state.snapshot.current();
    let caps = required_capabilities(&request, endpoint);
    let resolved = resolver::resolve(&snapshot, &requested_model, endpoint, &caps)?;
    let candidates = enrich_candidates(&snapshot, resolved);
    let policy = snapshot
        .policy_for(ctx.tenant_id.as_deref(), ctx.user_id.as_deref())
        .clone();

    let outcome = Orchestrator::run(
        &state.health,
        &state.quota,
        candidates,
        &policy,
        &[],
        Some(state.request_deadline),
        |provider_config| {
            let mut request = request.clone();
            request.model = provider_config
                .model_mapping
                .get(&requested_model)
                .cloned()
                .unwrap_or_else(|| requested_model.clone());
            async move {
                let provider = create_provider(provider_config).map_err(attempt_error)?;
                provider
                    .stream_chat_completion(request)
                    .await
                    .map_err(attempt_error)
            }
        },
    )
    .await;

    let (upstream, provider_key) = match outcome {
        Ok(pair) => pair,
        Err(e) => {
            let error: GatewayError = e.into();
            state.usage.record_usage(usage_record(
                ctx,
                &requested_model,
                "",
                "",
                0,
                0,
                0.0,
                false,
                Some(error.to_string()),
            ));
            return Err(error);
        }
    };

    let ctx = ctx.clone();
    let usage = state.usage.clone();
    let requested_model_for_task = requested_model.clone();
    let provider_key_for_task = provider_key.clone();

    let body = Body::from_stream(async_stream::stream! {
        let mut upstream = upstream;
        let mut state_machine = StreamState::Initial;
        let mut accumulator = ToolCallAccumulator::new();
        let mut content_len: u32 = 0;
        let mut resolved_model = String::new();
        let mut saw_error = false;

        while let Some(item) = upstream.next().await {
            match item {
                Ok(chunk) => {
                    if resolved_model.is_empty() {
                        resolved_model = chunk.model.clone();
                    }
                    if let Some(translated) = translate_chunk(&chunk, &mut state_machine, &mut accumulator) {
                        if let Some(delta) = &translated.content_delta {
                            content_len += delta.len() as u32;
                        }
                    }
                    let payload = serde_json::to_string(&chunk).unwrap_or_default();
                    yield Ok::<_, std::io::Error>(axum::body::Bytes::from(format!("data: {payload}\n\n")));
                }
                Err(e) => {
                    saw_error = true;
                    tracing::error!(error = %e, provider = %provider_key_for_task, "stream error mid-flight");
                    let payload = json!({"error": {"message": e.to_string(), "type": "ProviderError"}});
                    yield Ok(axum::body::Bytes::from(format!("data: {payload}\n\n")));
                    break;
                }
            }
        }

        for parse_error in accumulator.finish() {
            tracing::warn!(error = %parse_error, "tool call truncated at end of stream");
        }

        yield Ok(axum::body::Bytes::from_static(b"data: [DONE]\n\n"));

        usage.record_usage(usage_record(
            &ctx,
            &requested_model_for_task,
            &provider_key_for_task,
            &resolved_model,
            0,
            content_len,
            0.0,
            !saw_error,
            if saw_error { Some("stream error".to_string()) } else { None },
        ));
    });

    let mut resp = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .body(body)
        .expect("well-formed streaming response");
    insert_header(&mut resp, PROVIDER_HEADER, &provider_key);
    insert_header(&mut resp, RESOLVED_MODEL_HEADER, &requested_model);
    Ok(resp)
}

fn validate_chat_request(request: &ChatRequest) -> Result<(), GatewayError> {
    if request.model.trim().is_empty() {
        return Err(GatewayError::Validation {
            message: "model is required".to_string(),
        });
    }
    if request.messages.is_empty() {
        return Err(GatewayError::Validation {
            message: "messages must not be empty".to_string(),
        });
    }
    Ok(())
}

async fn handle(
    state: AppState,
    ctx: RequestContext,
    auth: Option<AuthContext>,
    endpoint: EndpointKind,
    mut request: ChatRequest,
) -> Result<Response, GatewayError> {
    request.endpoint_kind = endpoint;
    validate_chat_request(&request)?;
    if request.stream.unwrap_or(false) {
        dispatch_stream(&state, &ctx, auth.as_ref(), endpoint, request).await
    } else {
        dispatch_unary(&state, &ctx, auth.as_ref(), endpoint, request).await
    }
}

pub async fn chat_completions(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<RequestContext>,
    auth: Option<axum::Extension<AuthContext>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, GatewayError> {
    handle(state, ctx, auth.map(|e| e.0), EndpointKind::Chat, request).await
}

pub async fn completions(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<RequestContext>,
    auth: Option<axum::Extension<AuthContext>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, GatewayError> {
    handle(state, ctx, auth.map(|e| e.0), EndpointKind::Completions, request).await
}

pub async fn responses(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<RequestContext>,
    auth: Option<axum::Extension<AuthContext>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, GatewayError> {
    handle(state, ctx, auth.map(|e| e.0), EndpointKind::Responses, request).await
}

pub async fn embeddings(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<RequestContext>,
    auth: Option<axum::Extension<AuthContext>>,
    Json(request): Json<EmbeddingRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let auth = auth.map(|e| e.0);
    check_allowed_model(auth.as_ref(), &request.model)?;

    let snapshot = state.snapshot.current();
    let resolved = resolver::resolve(
        &snapshot,
        &request.model,
        EndpointKind::Embeddings,
        &[Capability::Embeddings],
    )?;
    let candidates = enrich_candidates(&snapshot, resolved);
    let policy = snapshot
        .policy_for(ctx.tenant_id.as_deref(), ctx.user_id.as_deref())
        .clone();

    let outcome = Orchestrator::run(
        &state.health,
        &state.quota,
        candidates,
        &policy,
        &[],
        Some(state.request_deadline),
        |provider_config| {
            let request = request.clone();
            async move {
                let provider = create_provider(provider_config).map_err(attempt_error)?;
                provider.embedding(request).await.map_err(attempt_error)
            }
        },
    )
    .await;

    match outcome {
        Ok((response, provider_key)) => {
            state
                .quota
                .record_usage(&provider_key, response.usage.prompt_tokens as u64, 0);
            state.usage.record_usage(usage_record(
                &ctx,
                &request.model,
                &provider_key,
                &response.model,
                response.usage.prompt_tokens,
                0,
                0.0,
                true,
                None,
            ));
            Ok(Json(serde_json::to_value(response).map_err(|e| GatewayError::Internal {
                message: e.to_string(),
            })?))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn list_models(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.snapshot.current();
    let models: Vec<_> = snapshot
        .declaration_order
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "owned_by": "synaxis",
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": models }))
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let snapshot = state.snapshot.current();
    if snapshot.declaration_order.iter().any(|m| m == &id) {
        Ok(Json(json!({ "id": id, "object": "model", "owned_by": "synaxis" })))
    } else {
        Err(GatewayError::ModelNotFound { model: id })
    }
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

pub async fn readiness(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    let snapshot = state.snapshot.current();
    if snapshot.providers.values().any(|p| p.enabled) {
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

pub async fn metrics() -> String {
    crate::metrics::get_prometheus_metrics().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_model() {
        let request = ChatRequest {
            model: "".to_string(),
            messages: vec![synaxis_core::models::Message::user("hi")],
            ..Default::default()
        };
        assert!(validate_chat_request(&request).is_err());
    }

    #[test]
    fn rejects_empty_messages() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![],
            ..Default::default()
        };
        assert!(validate_chat_request(&request).is_err());
    }

    #[test]
    fn classifies_rate_limit_as_retryable_kind() {
        assert_eq!(
            classify_provider_error(&ProviderError::RateLimit),
            AttemptErrorKind::RateLimit
        );
        assert_eq!(
            classify_provider_error(&ProviderError::Api { code: 503, message: "x".into() }),
            AttemptErrorKind::ProviderUnavailable
        );
    }

    #[test]
    fn allowed_models_list_blocks_other_models() {
        let ctx = AuthContext {
            api_key_id: "k".to_string(),
            tenant_id: "t".to_string(),
            user_id: None,
            allowed_models: Some(vec!["gpt-4o".to_string()]),
        };
        assert!(check_allowed_model(Some(&ctx), "gpt-4o").is_ok());
        assert!(check_allowed_model(Some(&ctx), "claude-3").is_err());
    }
}
