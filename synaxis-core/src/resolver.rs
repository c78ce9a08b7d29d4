//! # Model Resolver
//!
//! Maps a requested model name (or alias, or the special id `"default"`)
//! to the canonical model and the ordered set of providers that can serve
//! it for a given endpoint kind and capability set.
//!
//! Tie-breaking among the resulting candidates is left entirely to
//! [`crate::routing_score`]; this module only filters and returns
//! candidates in declaration order.

use thiserror::Error;

use crate::models::EndpointKind;
use crate::providers::{ProviderConfig, ProviderKind};
use crate::snapshot::{Capability, GatewaySnapshot};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("no providers found for model {model}")]
    NoProvidersForModel { model: String },
}

pub struct ResolvedCandidates {
    pub canonical_id: String,
    pub providers: Vec<ProviderConfig>,
}

fn endpoint_supported(kind: ProviderKind, endpoint: EndpointKind) -> bool {
    match kind {
        ProviderKind::Anthropic => matches!(endpoint, EndpointKind::Chat | EndpointKind::Responses),
        ProviderKind::GithubCopilot => matches!(endpoint, EndpointKind::Chat),
        ProviderKind::OpenAiCompatible | ProviderKind::AzureOpenAi => true,
    }
}

/// Resolves `requested_model` against `snapshot`, returning every enabled
/// provider that can serve the chosen canonical model under
/// `endpoint_kind` with at least `required_capabilities`.
pub fn resolve(
    snapshot: &GatewaySnapshot,
    requested_model: &str,
    endpoint_kind: EndpointKind,
    required_capabilities: &[Capability],
) -> Result<ResolvedCandidates, ResolverError> {
    let normalized = requested_model.to_lowercase();
    let known_id = |id: &str| snapshot.canonical_models.iter().any(|m| m.id == id);

    let canonical_id = if known_id(&normalized) {
        Some(normalized.clone())
    } else if let Some(target) = snapshot.aliases.get(&normalized) {
        Some(target.clone())
    } else if normalized == "default" {
        snapshot.declaration_order.first().cloned()
    } else {
        None
    }
    .ok_or_else(|| ResolverError::NoProvidersForModel {
        model: requested_model.to_string(),
    })?;

    let matching_models: Vec<&crate::snapshot::CanonicalModel> = snapshot
        .canonical_models
        .iter()
        .filter(|m| m.id == canonical_id)
        .collect();

    if matching_models.is_empty()
        || !matching_models
            .iter()
            .any(|m| m.supports(required_capabilities))
    {
        return Err(ResolverError::NoProvidersForModel {
            model: requested_model.to_string(),
        });
    }

    let providers: Vec<ProviderConfig> = matching_models
        .into_iter()
        .filter(|candidate_model| candidate_model.supports(required_capabilities))
        .filter_map(|candidate_model| snapshot.providers.get(&candidate_model.provider))
        .filter(|provider| provider.enabled)
        .filter(|provider| endpoint_supported(provider.kind, endpoint_kind))
        .cloned()
        .collect();

    if providers.is_empty() {
        return Err(ResolverError::NoProvidersForModel {
            model: requested_model.to_string(),
        });
    }

    Ok(ResolvedCandidates {
        canonical_id,
        providers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::CanonicalModel;

    fn snapshot_with_model() -> GatewaySnapshot {
        let mut snapshot = GatewaySnapshot::default();
        let mut provider = ProviderConfig::new("free1", "key");
        provider.kind = ProviderKind::OpenAiCompatible;
        snapshot.providers.insert("free1".to_string(), provider);
        snapshot.canonical_models.push(CanonicalModel {
            id: "m".to_string(),
            provider: "free1".to_string(),
            model_path: "m-upstream".to_string(),
            capabilities: vec![Capability::Streaming],
            aliases: vec!["gpt-4o".to_string()],
        });
        snapshot.aliases.insert("gpt-4o".to_string(), "m".to_string());
        snapshot.declaration_order.push("m".to_string());
        snapshot
    }

    #[test]
    fn resolves_exact_canonical_id() {
        let snapshot = snapshot_with_model();
        let resolved = resolve(&snapshot, "m", EndpointKind::Chat, &[]).unwrap();
        assert_eq!(resolved.canonical_id, "m");
        assert_eq!(resolved.providers.len(), 1);
    }

    #[test]
    fn alias_resolves_identically_to_target() {
        let snapshot = snapshot_with_model();
        let via_alias = resolve(&snapshot, "gpt-4o", EndpointKind::Chat, &[]).unwrap();
        let via_id = resolve(&snapshot, "m", EndpointKind::Chat, &[]).unwrap();
        assert_eq!(via_alias.canonical_id, via_id.canonical_id);
    }

    #[test]
    fn default_picks_first_declared_model() {
        let snapshot = snapshot_with_model();
        let resolved = resolve(&snapshot, "default", EndpointKind::Chat, &[]).unwrap();
        assert_eq!(resolved.canonical_id, "m");
    }

    #[test]
    fn unknown_model_fails() {
        let snapshot = snapshot_with_model();
        let result = resolve(&snapshot, "nonexistent", EndpointKind::Chat, &[]);
        assert!(matches!(result, Err(ResolverError::NoProvidersForModel { .. })));
    }

    #[test]
    fn missing_capability_fails() {
        let snapshot = snapshot_with_model();
        let result = resolve(&snapshot, "m", EndpointKind::Chat, &[Capability::Vision]);
        assert!(result.is_err());
    }
}
