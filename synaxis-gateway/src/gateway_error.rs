//! # Gateway Error Types
//!
//! The error kinds a request can fail with, mapped to HTTP status at the
//! single boundary where a [`GatewayError`] becomes a response. Whether the
//! orchestrator retries a failed attempt is encoded separately in
//! [`synaxis_core::orchestrator::AttemptErrorKind`] — this type is strictly
//! the client-facing surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use synaxis_core::orchestrator::{AttemptErrorKind, OrchestrationError};
use synaxis_core::resolver::ResolverError;
use synaxis_core::snapshot::SnapshotError;
use synaxis_core::translation::TranslationError;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("authentication error: {message}")]
    Auth { message: String },

    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    #[error("request body exceeds the configured limit")]
    PayloadTooLarge,

    #[error("rate limited: {message}")]
    RateLimit { message: String },

    #[error("provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("no providers available for this request")]
    NoProvidersAvailable,

    #[error("request deadline exceeded")]
    Timeout,

    #[error("provider error: {message}")]
    ProviderError { message: String },

    #[error("tool call arguments never closed before end of stream")]
    ToolCallParseError,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            GatewayError::Validation { .. } => (StatusCode::BAD_REQUEST, "Validation"),
            GatewayError::Auth { .. } => (StatusCode::UNAUTHORIZED, "Auth"),
            GatewayError::ModelNotFound { .. } => (StatusCode::NOT_FOUND, "ModelNotFound"),
            GatewayError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "PayloadTooLarge"),
            GatewayError::RateLimit { .. } => (StatusCode::TOO_MANY_REQUESTS, "RateLimit"),
            GatewayError::ProviderUnavailable { .. } => {
                (StatusCode::BAD_GATEWAY, "ProviderUnavailable")
            }
            GatewayError::NoProvidersAvailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "NoProvidersAvailable")
            }
            GatewayError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Timeout"),
            GatewayError::ProviderError { .. } => (StatusCode::BAD_GATEWAY, "ProviderError"),
            GatewayError::ToolCallParseError => (StatusCode::BAD_GATEWAY, "ToolCallParseError"),
            GatewayError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "Internal"),
        }
    }
}

impl From<ResolverError> for GatewayError {
    fn from(e: ResolverError) -> Self {
        match e {
            ResolverError::NoProvidersForModel { model } => GatewayError::ModelNotFound { model },
        }
    }
}

impl From<SnapshotError> for GatewayError {
    fn from(e: SnapshotError) -> Self {
        GatewayError::Internal {
            message: e.to_string(),
        }
    }
}

impl From<TranslationError> for GatewayError {
    fn from(_: TranslationError) -> Self {
        GatewayError::ToolCallParseError
    }
}

impl From<OrchestrationError> for GatewayError {
    fn from(e: OrchestrationError) -> Self {
        match e {
            OrchestrationError::Timeout => GatewayError::Timeout,
            OrchestrationError::Exhausted { attempts } => {
                let detail = attempts
                    .iter()
                    .map(|a| format!("{}: {:?} ({})", a.provider_key, a.kind, a.message))
                    .collect::<Vec<_>>()
                    .join("; ");

                // A single non-retryable failure (auth/validation/model-not-found) is the
                // orchestrator's own short-circuit; surface that exact status rather than
                // flattening it into a generic 503.
                let surfaced = match attempts.as_slice() {
                    [only] => match only.kind {
                        AttemptErrorKind::Validation => Some(GatewayError::Validation {
                            message: only.message.clone(),
                        }),
                        AttemptErrorKind::Auth => Some(GatewayError::Auth {
                            message: only.message.clone(),
                        }),
                        AttemptErrorKind::ModelNotFound => Some(GatewayError::ModelNotFound {
                            model: only.message.clone(),
                        }),
                        _ => None,
                    },
                    _ => None,
                };

                let err = surfaced.unwrap_or(GatewayError::NoProvidersAvailable);
                if attempts.is_empty() {
                    err
                } else {
                    err.with_attempts(detail)
                }
            }
        }
    }
}

impl GatewayError {
    /// Logs the full per-provider attempt ledger (never sent to the client)
    /// and returns the exhaustion error the client sees.
    fn with_attempts(self, detail: String) -> Self {
        tracing::warn!(attempts = %detail, "orchestration exhausted all candidates");
        self
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let message = self.to_string();
        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
            }
        }));
        (status, body).into_response()
    }
}
