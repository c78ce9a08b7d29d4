//! # Synaxis Core
//!
//! Core routing engine behind the Synaxis gateway: a single atomically-
//! swapped configuration snapshot, per-provider health and quota tracking,
//! a routing-score calculator, a tiered fallback orchestrator, and the
//! translation glue that keeps every upstream dialect looking like one
//! OpenAI-compatible wire format to callers.
//!
//! ## Overview
//!
//! - [`snapshot`] — hot-reloadable configuration ([`snapshot::GatewaySnapshot`],
//!   [`snapshot::SnapshotHandle`]).
//! - [`health`] — per-provider success/failure tracking with exponential
//!   cooldown ([`health::HealthStore`]).
//! - [`quota`] — fixed-window RPM/TPM admission ([`quota::QuotaTracker`]).
//! - [`cost`] — per-token cost lookup, free-tier aware ([`cost::CostService`]).
//! - [`resolver`] — requested model name/alias to canonical model and
//!   candidate providers ([`resolver::resolve`]).
//! - [`routing_score`] — scores a candidate for ordering within a tier
//!   ([`routing_score::score`]).
//! - [`orchestrator`] — walks tiers, admits candidates, retries, falls back
//!   ([`orchestrator::Orchestrator`]).
//! - [`translation`] — tool-call reassembly and streaming state machine
//!   ([`translation::translate_chunk`]).
//! - [`usage`] — buffered, best-effort usage logging ([`usage::UsageRecorder`]).
//! - [`providers`] — per-upstream adapters implementing a common [`providers::Provider`]
//!   trait.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use synaxis_core::snapshot::{GatewaySnapshot, SnapshotHandle};
//! use synaxis_core::health::HealthStore;
//! use synaxis_core::quota::QuotaTracker;
//!
//! let snapshot = GatewaySnapshot::default();
//! let handle = SnapshotHandle::new(snapshot);
//! let health = HealthStore::new();
//! let quota = QuotaTracker::new();
//!
//! let current = handle.current();
//! let resolved = synaxis_core::resolver::resolve(
//!     &current,
//!     "default",
//!     synaxis_core::models::EndpointKind::Chat,
//!     &[],
//! );
//! let _ = (resolved, health.is_healthy("none"), quota.check_quota("none", None, None));
//! ```

pub mod common;
pub mod cost;
pub mod error;
pub mod health;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod quota;
pub mod resolver;
pub mod routing_score;
pub mod snapshot;
pub mod translation;
pub mod usage;

pub use error::{ClientError, ProviderError};
pub use models::{ChatRequest, ChatResponse, Choice, EndpointKind, Message, Role, Usage};
pub use orchestrator::{AttemptError, AttemptErrorKind, EnrichedCandidate, Orchestrator, OrchestrationError};
pub use providers::{Provider, ProviderConfig, ProviderKind, ProviderMetrics};
pub use snapshot::{GatewaySnapshot, SnapshotHandle};

/// Result type for core operations, using [`ClientError`] as the error type.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatRequest, Message, Role};

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello, world!");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content, "Hello, world!");

        let assistant_msg = Message::assistant("Hi there!");
        assert_eq!(assistant_msg.role, Role::Assistant);
        assert_eq!(assistant_msg.content, "Hi there!");

        let system_msg = Message::system("You are a helpful assistant.");
        assert_eq!(system_msg.role, Role::System);
        assert_eq!(system_msg.content, "You are a helpful assistant.");
    }

    #[test]
    fn test_chat_request_default() {
        let request = ChatRequest::default();
        assert_eq!(request.model, "");
        assert_eq!(request.messages.len(), 0);
        assert_eq!(request.temperature, None);
        assert_eq!(request.max_tokens, None);
        assert_eq!(request.stream, None);
    }

    #[test]
    fn test_provider_config_creation() {
        let config = ProviderConfig::new("test-provider", "test-key");
        assert_eq!(config.name, "test-provider");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.timeout.as_secs(), 30);
        assert_eq!(config.max_retries, 3);
        assert!(config.enabled);
    }
}
