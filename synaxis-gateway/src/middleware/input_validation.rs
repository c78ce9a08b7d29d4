//! Body-size and numeric-range validation for chat/completion payloads.
//!
//! Runs after auth, before the body reaches a handler. Structural request
//! parsing (unknown model names, malformed JSON) is left to the handler,
//! which has the typed request struct; this middleware only enforces the
//! cheap invariants that are the same for every endpoint.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::server::AppState;

fn validate_parameters(json: &serde_json::Value) -> Result<(), String> {
    if let Some(temp) = json.get("temperature").and_then(|v| v.as_f64()) {
        if !(0.0..=2.0).contains(&temp) {
            return Err(format!("temperature {temp} must be between 0.0 and 2.0"));
        }
    }

    if let Some(max_tokens) = json.get("max_tokens").and_then(|v| v.as_u64()) {
        if max_tokens < 1 {
            return Err("max_tokens must be at least 1".to_string());
        }
    }

    if let Some(top_p) = json.get("top_p").and_then(|v| v.as_f64()) {
        if !(0.0..=1.0).contains(&top_p) {
            return Err(format!("top_p {top_p} must be between 0.0 and 1.0"));
        }
    }

    Ok(())
}

pub async fn input_validation_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();

    if !matches!(parts.method, axum::http::Method::POST) {
        let request = Request::from_parts(parts, body);
        return Ok(next.run(request).await);
    }

    let max_body_size = state.max_body_size;
    let body_bytes = match axum::body::to_bytes(body, max_body_size + 1).await {
        Ok(bytes) if bytes.len() > max_body_size => {
            warn!(size = bytes.len(), limit = max_body_size, "request body too large");
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
        Ok(bytes) => bytes,
        Err(_) => return Err(StatusCode::PAYLOAD_TOO_LARGE),
    };

    if !body_bytes.is_empty() {
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&body_bytes) {
            if let Err(message) = validate_parameters(&json) {
                warn!(%message, "request parameter validation failed");
                return Err(StatusCode::BAD_REQUEST);
            }
        }
    }

    let request = Request::from_parts(parts, axum::body::Body::from(body_bytes));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_out_of_range_rejected() {
        let json = serde_json::json!({"temperature": 5.0});
        assert!(validate_parameters(&json).is_err());
    }

    #[test]
    fn zero_max_tokens_rejected() {
        let json = serde_json::json!({"max_tokens": 0});
        assert!(validate_parameters(&json).is_err());
    }

    #[test]
    fn valid_parameters_accepted() {
        let json = serde_json::json!({"temperature": 0.7, "max_tokens": 256, "top_p": 0.9});
        assert!(validate_parameters(&json).is_ok());
    }
}
