//! # Routing Score Calculator
//!
//! Scores a candidate in `[0, 100]` under a [`RoutingScorePolicy`]:
//!
//! ```text
//! score = quality*Wq + quotaRemaining*Wr + rateLimitHeadroom*Wl + latencyScore*Wt
//! ```
//!
//! `latencyScore = max(0, 100 - averageLatencyMs/10)`,
//! `rateLimitHeadroom = 100 * (1 - observedUtilisation)`. Weights are
//! normalized to sum to 1 by [`RoutingScorePolicy::normalized`].

use crate::providers::ProviderConfig;
use crate::snapshot::RoutingScorePolicy;

/// Inputs C6 needs beyond what lives on [`ProviderConfig`] directly.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInputs {
    /// Fraction of the provider's rate limit already consumed in the
    /// current window, in `[0, 1]`.
    pub observed_utilisation: f64,
}

pub fn score(provider: &ProviderConfig, policy: &RoutingScorePolicy, inputs: ScoringInputs) -> f64 {
    let (wq, wr, wl, wt) = policy.normalized();

    let quality = provider.quality_score as f64 * 10.0; // 0-10 -> 0-100
    let quota_remaining = provider.estimated_quota_remaining as f64; // already 0-100
    let rate_limit_headroom = 100.0 * (1.0 - inputs.observed_utilisation.clamp(0.0, 1.0));
    let latency_score = provider
        .average_latency_ms
        .map(|ms| (100.0 - ms as f64 / 10.0).max(0.0))
        .unwrap_or(100.0);

    (quality * wq + quota_remaining * wr + rate_limit_headroom * wl + latency_score * wt).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;

    fn provider(quality: u8, quota: u8, latency_ms: u64) -> ProviderConfig {
        let mut p = ProviderConfig::new("p", "key");
        p.kind = ProviderKind::OpenAiCompatible;
        p.quality_score = quality;
        p.estimated_quota_remaining = quota;
        p.average_latency_ms = Some(latency_ms);
        p
    }

    #[test]
    fn even_weights_average_the_four_signals() {
        let policy = RoutingScorePolicy {
            quality_weight: 1.0,
            quota_weight: 1.0,
            rate_limit_weight: 1.0,
            latency_weight: 1.0,
            ..Default::default()
        };
        let candidate = provider(10, 100, 0);
        let inputs = ScoringInputs {
            observed_utilisation: 0.0,
        };
        // quality=100, quota=100, headroom=100, latency=100 -> average 100
        assert_eq!(score(&candidate, &policy, inputs), 100.0);
    }

    #[test]
    fn higher_latency_lowers_score() {
        let policy = RoutingScorePolicy::default();
        let fast = provider(5, 50, 10);
        let slow = provider(5, 50, 900);
        let inputs = ScoringInputs {
            observed_utilisation: 0.2,
        };
        assert!(score(&fast, &policy, inputs) > score(&slow, &policy, inputs));
    }

    #[test]
    fn zero_weight_policy_falls_back_to_even_split() {
        let policy = RoutingScorePolicy {
            quality_weight: 0.0,
            quota_weight: 0.0,
            rate_limit_weight: 0.0,
            latency_weight: 0.0,
            ..Default::default()
        };
        let candidate = provider(10, 100, 0);
        let inputs = ScoringInputs {
            observed_utilisation: 0.0,
        };
        assert_eq!(score(&candidate, &policy, inputs), 100.0);
    }
}
