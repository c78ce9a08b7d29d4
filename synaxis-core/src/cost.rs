//! # Cost Service
//!
//! Resolves the [`ModelCost`] for a `(providerKey, canonicalId)` pair.
//! Entries come from the config snapshot; a missing entry is treated as
//! infinite cost and non-free rather than an error, since "no pricing
//! known" is a routing signal, not a failure.

use crate::snapshot::ModelCost;

/// A candidate enriched with pricing, ready for C6 scoring.
#[derive(Debug, Clone)]
pub struct EnrichedCost {
    pub is_free: bool,
    /// Cost per output token; `f64::INFINITY` when unknown.
    pub cost_per_token: f64,
}

pub struct CostService;

impl CostService {
    /// Looks up `(provider_key, canonical_id)` in the snapshot's cost
    /// table, folding in the provider's own `is_free` flag — a provider
    /// marked free overrides a model-level cost entry either way.
    pub fn resolve(
        costs: &std::collections::HashMap<(String, String), ModelCost>,
        provider_key: &str,
        canonical_id: &str,
        provider_is_free: bool,
    ) -> EnrichedCost {
        match costs.get(&(provider_key.to_string(), canonical_id.to_string())) {
            Some(cost) => EnrichedCost {
                is_free: provider_is_free || cost.free_tier,
                cost_per_token: if cost.free_tier {
                    0.0
                } else {
                    cost.output_cost_per_token
                },
            },
            None => EnrichedCost {
                is_free: provider_is_free,
                cost_per_token: if provider_is_free {
                    0.0
                } else {
                    f64::INFINITY
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entry_is_infinite_and_not_free() {
        let costs = std::collections::HashMap::new();
        let enriched = CostService::resolve(&costs, "p", "m", false);
        assert!(!enriched.is_free);
        assert_eq!(enriched.cost_per_token, f64::INFINITY);
    }

    #[test]
    fn provider_free_flag_overrides_missing_cost_entry() {
        let costs = std::collections::HashMap::new();
        let enriched = CostService::resolve(&costs, "p", "m", true);
        assert!(enriched.is_free);
        assert_eq!(enriched.cost_per_token, 0.0);
    }

    #[test]
    fn free_tier_cost_entry_zeroes_cost() {
        let mut costs = std::collections::HashMap::new();
        costs.insert(
            ("p".to_string(), "m".to_string()),
            ModelCost {
                input_cost_per_token: 0.01,
                output_cost_per_token: 0.02,
                free_tier: true,
            },
        );
        let enriched = CostService::resolve(&costs, "p", "m", false);
        assert!(enriched.is_free);
        assert_eq!(enriched.cost_per_token, 0.0);
    }
}
