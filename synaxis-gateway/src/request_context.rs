//! # Request Context
//!
//! Per-request identity and timing, threaded through `axum` extensions from
//! the auth middleware down to the handler that emits the final
//! [`synaxis_core::usage::UsageRecord`].

use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub api_key_id: Option<String>,
    pub start_time: Instant,
    pub metadata: std::collections::HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id: None,
            user_id: None,
            api_key_id: None,
            start_time: Instant::now(),
            metadata: std::collections::HashMap::new(),
        }
    }

    pub fn with_auth(ctx: &crate::auth::AuthContext) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id: Some(ctx.tenant_id.clone()),
            user_id: ctx.user_id.clone(),
            api_key_id: Some(ctx.api_key_id.clone()),
            start_time: Instant::now(),
            metadata: std::collections::HashMap::new(),
        }
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn with_metadata(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub fn get_metadata(&self, key: &str) -> Option<&String> {
        self.metadata.get(key)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
