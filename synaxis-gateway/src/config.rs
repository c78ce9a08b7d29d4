//! # Configuration & Hot-Reload
//!
//! Loads the TOML file named by `SYNAXIS_CONFIG`, builds a validated
//! [`synaxis_core::snapshot::GatewaySnapshot`], and polls the file every
//! `SYNAXIS_RELOAD_SECONDS` (default 5) for changes, publishing each new
//! snapshot through a [`SnapshotHandle`]. A malformed reload is logged and
//! skipped; the previous snapshot stays in force.
//!
//! ## Configuration File Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 5000
//! max_body_size = 10485760
//!
//! [server.cors]
//! enabled = true
//! allowed_origins = ["*"]
//! allowed_methods = ["GET", "POST"]
//!
//! [providers.free1]
//! kind = "openai-compatible"
//! api_key = ""
//! base_url = "http://localhost:11434/v1"
//! is_free = true
//! quality_score = 6
//!
//! [providers.paid1]
//! kind = "openai-compatible"
//! api_key = "sk-..."
//! base_url = "https://api.openai.com/v1"
//! is_free = false
//! quality_score = 9
//!
//! [[canonical_models]]
//! id = "m"
//! provider = "free1"
//! model_path = "llama3"
//! capabilities = ["streaming"]
//! aliases = ["gpt-4o"]
//!
//! [auth]
//! enabled = true
//! ```

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use synaxis_core::providers::ProviderConfig;
use synaxis_core::snapshot::{CanonicalModel, GatewaySnapshot, ModelCost, RoutingScorePolicy, SnapshotHandle};

use crate::error_handling::{ErrorHandler, ErrorType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub canonical_models: Vec<CanonicalModel>,
    #[serde(default)]
    pub costs: Vec<CostEntry>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub routing_policy: RoutingScorePolicy,
    pub logging: LoggingConfig,
}

/// Flattened (provider, canonical model) cost entry, reshaped into
/// [`GatewaySnapshot::costs`]'s map keying at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub provider: String,
    pub canonical_id: String,
    #[serde(flatten)]
    pub cost: ModelCost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "synaxis_core::common::duration_serde")]
    pub timeout: Duration,
    pub max_body_size: usize,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub max_age: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub enabled: bool,
    pub api_keys: Vec<ApiKeyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub name: String,
    pub enabled: bool,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub allowed_models: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(listen) = env::var("SYNAXIS_LISTEN") {
            if let Some((host, port)) = listen.split_once(':') {
                self.server.host = host.to_string();
                self.server.port = port
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid SYNAXIS_LISTEN port: {}", port))?;
            }
        }

        if let Ok(max_body) = env::var("SYNAXIS_MAX_BODY_BYTES") {
            self.server.max_body_size = max_body
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid SYNAXIS_MAX_BODY_BYTES: {}", max_body))?;
        }

        if let Ok(deadline) = env::var("SYNAXIS_REQUEST_DEADLINE_SECONDS") {
            let seconds: u64 = deadline
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid SYNAXIS_REQUEST_DEADLINE_SECONDS: {}", deadline))?;
            self.server.timeout = Duration::from_secs(seconds);
        }

        for (provider_name, provider_config) in &mut self.providers {
            let env_key = format!("{}_API_KEY", provider_name.to_uppercase().replace('-', "_"));
            if let Ok(api_key) = env::var(&env_key) {
                if !api_key.is_empty() {
                    provider_config.api_key = api_key;
                }
            } else if provider_config.api_key.is_empty()
                && !provider_name.to_lowercase().contains("ollama")
            {
                tracing::warn!(
                    "no API key found for provider {} (set {})",
                    provider_name,
                    env_key
                );
            }
        }

        if let Ok(level) = env::var("GATEWAY_LOG_LEVEL") {
            let valid = ["trace", "debug", "info", "warn", "error"];
            if valid.contains(&level.as_str()) {
                self.logging.level = level;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ErrorHandler::handle_sync_operation(
            || {
                self.validate_server()?;
                self.validate_providers()?;
                self.validate_auth()?;
                Ok(())
            },
            "Configuration validation",
            ErrorType::Config,
        )
        .map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(())
    }

    fn validate_server(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server port must be between 1 and 65535"));
        }
        if self.server.max_body_size == 0 {
            return Err(anyhow::anyhow!("max_body_size cannot be 0"));
        }
        if self.server.cors.enabled && self.server.cors.allowed_origins.is_empty() {
            return Err(anyhow::anyhow!("CORS enabled but no allowed origins specified"));
        }
        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            return Err(anyhow::anyhow!("at least one provider must be configured"));
        }
        for (name, provider) in &self.providers {
            if !provider.enabled {
                continue;
            }
            if provider.api_key.is_empty() && !name.to_lowercase().contains("ollama") {
                return Err(anyhow::anyhow!("provider {} has empty API key", name));
            }
            if let Some(base_url) = &provider.base_url {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(anyhow::anyhow!(
                        "provider {} base_url must start with http:// or https://",
                        name
                    ));
                }
            }
        }
        for model in &self.canonical_models {
            if !self.providers.contains_key(&model.provider) {
                return Err(anyhow::anyhow!(
                    "canonical model {} references unknown provider {}",
                    model.id,
                    model.provider
                ));
            }
        }
        Ok(())
    }

    fn validate_auth(&self) -> anyhow::Result<()> {
        if self.auth.enabled {
            if self.auth.api_keys.is_empty() {
                return Err(anyhow::anyhow!("auth enabled but no API keys configured"));
            }
            let mut seen = std::collections::HashSet::new();
            for api_key in &self.auth.api_keys {
                if api_key.key.len() < 16 {
                    return Err(anyhow::anyhow!(
                        "API key {} is too short (minimum 16 characters)",
                        api_key.name
                    ));
                }
                if !seen.insert(&api_key.key) {
                    return Err(anyhow::anyhow!("duplicate API key: {}", api_key.key));
                }
            }
        }
        Ok(())
    }

    /// Builds and validates the [`GatewaySnapshot`] this config describes.
    pub fn to_snapshot(&self) -> anyhow::Result<GatewaySnapshot> {
        let mut declaration_order = Vec::new();
        let mut aliases = HashMap::new();
        for model in &self.canonical_models {
            if !declaration_order.contains(&model.id) {
                declaration_order.push(model.id.clone());
            }
            for alias in &model.aliases {
                aliases.insert(alias.clone(), model.id.clone());
            }
        }

        let mut costs = HashMap::new();
        for entry in &self.costs {
            costs.insert((entry.provider.clone(), entry.canonical_id.clone()), entry.cost);
        }

        let snapshot = GatewaySnapshot {
            providers: self.providers.clone(),
            canonical_models: self.canonical_models.clone(),
            aliases,
            costs,
            global_policy: self.routing_policy,
            tenant_policies: HashMap::new(),
            user_policies: HashMap::new(),
            declaration_order,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                timeout: Duration::from_secs(60),
                max_body_size: 10 * 1024 * 1024,
                cors: CorsConfig {
                    enabled: true,
                    allowed_origins: vec!["*".to_string()],
                    allowed_methods: vec!["GET".to_string(), "POST".to_string()],
                    allowed_headers: vec!["*".to_string()],
                    max_age: Some(Duration::from_secs(3600)),
                },
            },
            providers: HashMap::new(),
            canonical_models: Vec::new(),
            costs: Vec::new(),
            auth: AuthConfig {
                enabled: false,
                api_keys: vec![],
            },
            routing_policy: RoutingScorePolicy::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    synaxis_core::common::duration_serde::parse_duration(s)
}

/// Polls `path` every `interval`, publishing a fresh snapshot into `handle`
/// whenever the file's content changes and parses successfully. Runs until
/// cancelled; a malformed or invalid reload is logged and skipped.
pub async fn watch_and_reload(path: String, handle: SnapshotHandle, interval: Duration) {
    let mut last_content: Option<String> = None;
    loop {
        tokio::time::sleep(interval).await;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, path = %path, "failed to read config for reload");
                continue;
            }
        };
        if last_content.as_deref() == Some(content.as_str()) {
            continue;
        }
        match reload_from_str(&content) {
            Ok(snapshot) => {
                if let Err(e) = handle.publish(snapshot) {
                    tracing::warn!(error = %e, "rejected reloaded configuration, keeping previous snapshot");
                } else {
                    tracing::info!("published reloaded configuration snapshot");
                    last_content = Some(content);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse reloaded configuration");
            }
        }
    }
}

fn reload_from_str(content: &str) -> anyhow::Result<GatewaySnapshot> {
    let config: Config = toml::from_str(content)?;
    config.to_snapshot()
}
