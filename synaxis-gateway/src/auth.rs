//! # Authentication
//!
//! Maps a bearer API key to the tenant/user identity context the rest of
//! the pipeline needs: [`crate::config::ApiKeyConfig`] entries are the
//! source of truth, looked up by exact key match. No JWT, no sessions, no
//! per-instance rate limiting here — request admission is governed
//! entirely by [`synaxis_core::quota::QuotaTracker`] at the provider level.

use std::collections::HashMap;

use crate::config::AuthConfig;
use crate::gateway_error::GatewayError;

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub api_key_id: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub allowed_models: Option<Vec<String>>,
}

/// Looks up API keys by exact value. Built once per published config;
/// rebuilt whenever the gateway reloads, same as the routing snapshot.
#[derive(Debug, Default)]
pub struct AuthService {
    enabled: bool,
    keys_by_value: HashMap<String, AuthContext>,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let mut keys_by_value = HashMap::new();
        for entry in config.api_keys.into_iter().filter(|k| k.enabled) {
            keys_by_value.insert(
                entry.key.clone(),
                AuthContext {
                    api_key_id: entry.name,
                    tenant_id: entry.tenant_id,
                    user_id: entry.user_id,
                    allowed_models: entry.allowed_models,
                },
            );
        }
        Self {
            enabled: config.enabled,
            keys_by_value,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn extract_api_key_from_header(auth_header: Option<&str>) -> Option<String> {
        auth_header?.strip_prefix("Bearer ").map(str::trim).map(str::to_string)
    }

    pub fn validate_api_key(&self, api_key: &str) -> Result<AuthContext, GatewayError> {
        self.keys_by_value
            .get(api_key)
            .cloned()
            .ok_or_else(|| GatewayError::Auth {
                message: "invalid API key".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeyConfig;

    fn config_with_key() -> AuthConfig {
        AuthConfig {
            enabled: true,
            api_keys: vec![ApiKeyConfig {
                key: "sk-test-0123456789abcdef".to_string(),
                name: "test-key".to_string(),
                enabled: true,
                tenant_id: "tenant-a".to_string(),
                user_id: Some("user-a".to_string()),
                allowed_models: None,
            }],
        }
    }

    #[test]
    fn resolves_known_key_to_identity() {
        let service = AuthService::new(config_with_key());
        let ctx = service.validate_api_key("sk-test-0123456789abcdef").unwrap();
        assert_eq!(ctx.tenant_id, "tenant-a");
        assert_eq!(ctx.user_id.as_deref(), Some("user-a"));
    }

    #[test]
    fn rejects_unknown_key() {
        let service = AuthService::new(config_with_key());
        assert!(service.validate_api_key("sk-unknown").is_err());
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(
            AuthService::extract_api_key_from_header(Some("Bearer sk-abc")),
            Some("sk-abc".to_string())
        );
        assert_eq!(AuthService::extract_api_key_from_header(Some("sk-abc")), None);
        assert_eq!(AuthService::extract_api_key_from_header(None), None);
    }
}
