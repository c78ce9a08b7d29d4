//! # Configuration Snapshot
//!
//! The gateway's routing state — providers, canonical models, aliases, and
//! scoring policies — lives behind a single atomically-swapped pointer. A
//! request that begins resolving under snapshot *N* keeps seeing snapshot
//! *N* for the rest of its lifetime, even if a reload publishes *N+1*
//! concurrently: readers hold their own `Arc` to the snapshot they loaded.
//!
//! The background reload loop (see `synaxis-gateway`'s config module) is the
//! only writer; everything downstream only ever calls [`SnapshotHandle::current`].

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::ProviderConfig;

/// Model capabilities a `CanonicalModel` may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Streaming,
    Tools,
    Vision,
    Reasoning,
    StructuredOutput,
    Embeddings,
}

/// A logical model id exposed to clients, independent of upstream naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalModel {
    /// Unique id visible to clients.
    pub id: String,
    /// Key of the `ProviderConfig` that serves this model.
    pub provider: String,
    /// Model path sent to the upstream (e.g. `"gpt-4o-mini"`).
    pub model_path: String,
    /// Capabilities this model supports.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Additional names that resolve to this canonical model.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CanonicalModel {
    pub fn supports(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }
}

/// Per-(provider, canonical model) pricing, see [`crate::cost`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelCost {
    pub input_cost_per_token: f64,
    pub output_cost_per_token: f64,
    #[serde(default)]
    pub free_tier: bool,
}

/// Scope a [`RoutingScorePolicy`] applies to. Lookup precedence is
/// `User` > `Tenant` > `Global`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope")]
pub enum PolicyScope {
    Global,
    Tenant { tenant_id: String },
    User { user_id: String },
}

/// Weights C6 applies when scoring a candidate. Normalized to sum to 1 at
/// load time so callers never have to re-normalize.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutingScorePolicy {
    pub scope: PolicyScopeKind,
    #[serde(default = "default_weight")]
    pub quality_weight: f64,
    #[serde(default = "default_weight")]
    pub quota_weight: f64,
    #[serde(default = "default_weight")]
    pub rate_limit_weight: f64,
    #[serde(default = "default_weight")]
    pub latency_weight: f64,
}

fn default_weight() -> f64 {
    0.25
}

/// Cheap copy of [`PolicyScope`] without the owned id, used as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScopeKind {
    Global,
    Tenant,
    User,
}

impl RoutingScorePolicy {
    /// Returns weights normalized to sum to 1, falling back to an even
    /// split if all weights were zero.
    pub fn normalized(&self) -> (f64, f64, f64, f64) {
        let total =
            self.quality_weight + self.quota_weight + self.rate_limit_weight + self.latency_weight;
        if total <= 0.0 {
            return (0.25, 0.25, 0.25, 0.25);
        }
        (
            self.quality_weight / total,
            self.quota_weight / total,
            self.rate_limit_weight / total,
            self.latency_weight / total,
        )
    }
}

/// The full, validated routing configuration at a point in time.
#[derive(Debug, Clone, Default)]
pub struct GatewaySnapshot {
    pub providers: HashMap<String, ProviderConfig>,
    /// One entry per (canonical id, provider) pair — several entries may
    /// share the same `id` when multiple providers serve the same logical
    /// model, which is exactly what lets C6/C7 choose among them.
    pub canonical_models: Vec<CanonicalModel>,
    pub aliases: HashMap<String, String>,
    pub costs: HashMap<(String, String), ModelCost>,
    /// Global policy plus any tenant/user overrides, keyed by id.
    pub global_policy: RoutingScorePolicy,
    pub tenant_policies: HashMap<String, RoutingScorePolicy>,
    pub user_policies: HashMap<String, RoutingScorePolicy>,
    /// Declaration order of canonical models, used to resolve `"default"`.
    pub declaration_order: Vec<String>,
}

impl Default for RoutingScorePolicy {
    fn default() -> Self {
        Self {
            scope: PolicyScopeKind::Global,
            quality_weight: 0.25,
            quota_weight: 0.25,
            rate_limit_weight: 0.25,
            latency_weight: 0.25,
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("canonical model {model} references unknown provider {provider}")]
    DanglingProvider { model: String, provider: String },
    #[error("policy for {scope} has a negative weight")]
    NegativeWeight { scope: String },
}

impl GatewaySnapshot {
    /// Validates cross-references before a snapshot is allowed to publish.
    /// Every `CanonicalModel.provider` must resolve to a configured
    /// `ProviderConfig`, and every policy's weights must be non-negative.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for model in &self.canonical_models {
            if !self.providers.contains_key(&model.provider) {
                return Err(SnapshotError::DanglingProvider {
                    model: model.id.clone(),
                    provider: model.provider.clone(),
                });
            }
        }
        let policies = std::iter::once(&self.global_policy)
            .chain(self.tenant_policies.values())
            .chain(self.user_policies.values());
        for policy in policies {
            if policy.quality_weight < 0.0
                || policy.quota_weight < 0.0
                || policy.rate_limit_weight < 0.0
                || policy.latency_weight < 0.0
            {
                return Err(SnapshotError::NegativeWeight {
                    scope: format!("{:?}", policy.scope),
                });
            }
        }
        Ok(())
    }

    /// Effective policy for a request, following User > Tenant > Global.
    pub fn policy_for(&self, tenant_id: Option<&str>, user_id: Option<&str>) -> &RoutingScorePolicy {
        if let Some(user_id) = user_id {
            if let Some(policy) = self.user_policies.get(user_id) {
                return policy;
            }
        }
        if let Some(tenant_id) = tenant_id {
            if let Some(policy) = self.tenant_policies.get(tenant_id) {
                return policy;
            }
        }
        &self.global_policy
    }
}

/// Atomically-swapped handle to the current [`GatewaySnapshot`].
///
/// Cloning is cheap (it clones an `Arc<ArcSwap<..>>`); every clone observes
/// the same published snapshot stream.
#[derive(Clone)]
pub struct SnapshotHandle {
    inner: Arc<ArcSwap<GatewaySnapshot>>,
}

impl SnapshotHandle {
    pub fn new(initial: GatewaySnapshot) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    /// Returns an `Arc` to the snapshot in force right now. Holding onto
    /// this value for the duration of a request is what gives callers a
    /// consistent view even across a concurrent reload.
    pub fn current(&self) -> Arc<GatewaySnapshot> {
        self.inner.load_full()
    }

    /// Validates `next`, then atomically publishes it. Returns the
    /// validation error (and leaves the previous snapshot untouched) if
    /// `next` is malformed.
    pub fn publish(&self, next: GatewaySnapshot) -> Result<(), SnapshotError> {
        next.validate()?;
        self.inner.store(Arc::new(next));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(key: &str) -> ProviderConfig {
        ProviderConfig::new(key, "secret")
    }

    #[test]
    fn rejects_dangling_provider_reference() {
        let mut snapshot = GatewaySnapshot::default();
        snapshot.canonical_models.push(CanonicalModel {
            id: "m".to_string(),
            provider: "ghost".to_string(),
            model_path: "m-path".to_string(),
            capabilities: vec![],
            aliases: vec![],
        });
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::DanglingProvider { .. })
        ));
    }

    #[test]
    fn publish_keeps_old_snapshot_on_rejection() {
        let handle = SnapshotHandle::new(GatewaySnapshot::default());
        let mut bad = GatewaySnapshot::default();
        bad.canonical_models.push(CanonicalModel {
            id: "m".to_string(),
            provider: "ghost".to_string(),
            model_path: "m".to_string(),
            capabilities: vec![],
            aliases: vec![],
        });
        assert!(handle.publish(bad).is_err());
        assert!(handle.current().canonical_models.is_empty());
    }

    #[test]
    fn policy_precedence_user_then_tenant_then_global() {
        let mut snapshot = GatewaySnapshot::default();
        snapshot.providers.insert("p".to_string(), provider("p"));
        snapshot.tenant_policies.insert(
            "tenant-a".to_string(),
            RoutingScorePolicy {
                scope: PolicyScopeKind::Tenant,
                quality_weight: 1.0,
                ..Default::default()
            },
        );
        snapshot.user_policies.insert(
            "user-a".to_string(),
            RoutingScorePolicy {
                scope: PolicyScopeKind::User,
                quality_weight: 2.0,
                ..Default::default()
            },
        );

        let effective = snapshot.policy_for(Some("tenant-a"), Some("user-a"));
        assert_eq!(effective.quality_weight, 2.0);

        let effective = snapshot.policy_for(Some("tenant-a"), Some("unknown-user"));
        assert_eq!(effective.quality_weight, 1.0);

        let effective = snapshot.policy_for(Some("unknown-tenant"), None);
        assert_eq!(effective.quality_weight, 0.25);
    }
}
