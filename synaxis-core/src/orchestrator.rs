//! # Fallback Orchestrator
//!
//! Partitions a resolver's candidate list into tiers — preferred (T0),
//! free (T1), paid (T2), emergency (T3, bypasses quota) — orders each
//! tier by routing score, and walks tiers in order, admitting candidates
//! past health/quota and retrying transient failures with jittered
//! backoff before moving to the next candidate.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::sleep;

use crate::cost::CostService;
use crate::health::HealthStore;
use crate::providers::ProviderConfig;
use crate::quota::{Admission, QuotaTracker};
use crate::routing_score::{self, ScoringInputs};
use crate::snapshot::{ModelCost, RoutingScorePolicy};

/// Max same-candidate retries for a single attempt before moving on.
const MAX_RETRIES: u32 = 3;
const JITTER_MIN_MS: u64 = 100;
const JITTER_MAX_MS: u64 = 800;
const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptErrorKind {
    Validation,
    Auth,
    ModelNotFound,
    RateLimit,
    ProviderUnavailable,
    ProviderError,
    ToolCallParseError,
}

impl AttemptErrorKind {
    /// Retryable conditions for a single candidate are network error /
    /// 5xx / 429. `ProviderError` ("anything else") gets exactly one
    /// retry; everything else is not retried in place.
    fn retries_same_candidate(self, attempts_so_far: u32) -> bool {
        match self {
            AttemptErrorKind::RateLimit | AttemptErrorKind::ProviderUnavailable => {
                attempts_so_far < MAX_RETRIES
            }
            AttemptErrorKind::ProviderError => attempts_so_far < 1,
            _ => false,
        }
    }

    /// Whether the orchestrator should move on to the next candidate in
    /// the tier rather than surfacing the error immediately.
    fn advances_to_next_candidate(self) -> bool {
        matches!(
            self,
            AttemptErrorKind::RateLimit
                | AttemptErrorKind::ProviderUnavailable
                | AttemptErrorKind::ProviderError
        )
    }
}

#[derive(Debug, Clone)]
pub struct AttemptError {
    pub kind: AttemptErrorKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct EnrichedCandidate {
    pub provider: ProviderConfig,
    pub canonical_id: String,
    pub resolved_model_path: String,
    pub is_free: bool,
    pub cost_per_token: f64,
}

impl EnrichedCandidate {
    pub fn new(
        provider: ProviderConfig,
        canonical_id: String,
        resolved_model_path: String,
        costs: &std::collections::HashMap<(String, String), ModelCost>,
    ) -> Self {
        let enriched = CostService::resolve(costs, &provider.name, &canonical_id, provider.is_free);
        Self {
            is_free: enriched.is_free,
            cost_per_token: enriched.cost_per_token,
            provider,
            canonical_id,
            resolved_model_path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider_key: String,
    pub kind: AttemptErrorKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum OrchestrationError {
    /// All tiers were exhausted; carries every attempted provider and why
    /// it failed, in attempt order.
    Exhausted { attempts: Vec<ProviderFailure> },
    /// The cumulative orchestration deadline elapsed.
    Timeout,
}

fn tier_of(candidate: &EnrichedCandidate, preferred_keys: &[String]) -> u8 {
    if preferred_keys.contains(&candidate.provider.name) {
        0
    } else if candidate.is_free {
        1
    } else {
        2
    }
}

/// Orders candidates within a tier: score descending, then `tier` field
/// ascending, then cost ascending, then declaration (input) order.
fn order_tier(
    mut candidates: Vec<EnrichedCandidate>,
    policy: &RoutingScorePolicy,
) -> Vec<EnrichedCandidate> {
    let scores: Vec<f64> = candidates
        .iter()
        .map(|c| {
            routing_score::score(
                &c.provider,
                policy,
                ScoringInputs {
                    observed_utilisation: 0.0,
                },
            )
        })
        .collect();
    let mut indices: Vec<usize> = (0..candidates.len()).collect();
    indices.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(candidates[a].provider.tier.cmp(&candidates[b].provider.tier))
            .then(
                candidates[a]
                    .cost_per_token
                    .partial_cmp(&candidates[b].cost_per_token)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.cmp(&b))
    });
    let originals = std::mem::take(&mut candidates);
    let mut by_index: Vec<Option<EnrichedCandidate>> = originals.into_iter().map(Some).collect();
    indices
        .into_iter()
        .map(|i| by_index[i].take().expect("each index visited once"))
        .collect()
}

fn jittered_backoff(attempt: u32) -> Duration {
    let base_ms = 2u64.saturating_pow(attempt) * JITTER_MIN_MS;
    let jitter = rand::thread_rng().gen_range(JITTER_MIN_MS..=JITTER_MAX_MS);
    Duration::from_millis(base_ms.min(JITTER_MAX_MS) + jitter / 4)
}

/// Stateless orchestrator; the health/quota stores it consults are shared
/// across the whole gateway, passed in by reference per call.
pub struct Orchestrator;

impl Orchestrator {
    /// Walks tiers T0..T3 of `candidates`, calling `attempt` for each
    /// admitted candidate until one succeeds or every tier is exhausted.
    /// `attempt` performs the actual provider call (translation + adapter
    /// invocation); this function owns only tiering, admission, retry,
    /// and deadline bookkeeping.
    pub async fn run<T, F, Fut>(
        health: &HealthStore,
        quota: &QuotaTracker,
        candidates: Vec<EnrichedCandidate>,
        policy: &RoutingScorePolicy,
        preferred_keys: &[String],
        deadline: Option<Duration>,
        mut attempt: F,
    ) -> Result<(T, String), OrchestrationError>
    where
        F: FnMut(ProviderConfig) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let deadline = deadline.unwrap_or(DEFAULT_DEADLINE);
        let start = Instant::now();

        let mut tiers: [Vec<EnrichedCandidate>; 4] = Default::default();
        for candidate in candidates {
            let tier = tier_of(&candidate, preferred_keys);
            tiers[tier as usize].push(candidate.clone());
            // T3 (emergency) sees every candidate too.
            tiers[3].push(candidate);
        }
        for tier in tiers.iter_mut() {
            let ordered = order_tier(std::mem::take(tier), policy);
            *tier = ordered;
        }

        let mut failures = Vec::new();
        for (tier_index, tier) in tiers.into_iter().enumerate() {
            let is_emergency = tier_index == 3;
            for candidate in tier {
                if start.elapsed() >= deadline {
                    return Err(OrchestrationError::Timeout);
                }
                if !health.is_healthy(&candidate.provider.name) {
                    continue;
                }
                if !is_emergency {
                    let status = quota.check_quota(
                        &candidate.provider.name,
                        candidate.provider.rate_limit.as_ref().map(|r| r.requests_per_minute),
                        candidate.provider.rate_limit.as_ref().map(|r| r.tokens_per_minute),
                    );
                    if status.admission == Admission::Deny {
                        continue;
                    }
                }

                let mut attempts_so_far = 0;
                loop {
                    match attempt(candidate.provider.clone()).await {
                        Ok(value) => {
                            health.mark_success(&candidate.provider.name);
                            return Ok((value, candidate.provider.name.clone()));
                        }
                        Err(err) => {
                            if err.kind.retries_same_candidate(attempts_so_far) {
                                attempts_so_far += 1;
                                sleep(jittered_backoff(attempts_so_far)).await;
                                continue;
                            }
                            health.mark_failure(&candidate.provider.name, None);
                            failures.push(ProviderFailure {
                                provider_key: candidate.provider.name.clone(),
                                kind: err.kind,
                                message: err.message,
                            });
                            break;
                        }
                    }
                }

                if failures
                    .last()
                    .map(|f| !f.kind.advances_to_next_candidate())
                    .unwrap_or(false)
                {
                    // Non-retryable-at-tier-level error (validation, auth,
                    // model-not-found): surface immediately rather than
                    // burning through the rest of the tier.
                    return Err(OrchestrationError::Exhausted { attempts: failures });
                }
            }
        }

        Err(OrchestrationError::Exhausted { attempts: failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn provider(name: &str, is_free: bool, latency_ms: u64) -> ProviderConfig {
        let mut p = ProviderConfig::new(name, "key");
        p.kind = ProviderKind::OpenAiCompatible;
        p.is_free = is_free;
        p.average_latency_ms = Some(latency_ms);
        p
    }

    fn candidate(name: &str, is_free: bool, latency_ms: u64, cost: f64) -> EnrichedCandidate {
        EnrichedCandidate {
            provider: provider(name, is_free, latency_ms),
            canonical_id: "m".to_string(),
            resolved_model_path: "m-upstream".to_string(),
            is_free,
            cost_per_token: cost,
        }
    }

    #[tokio::test]
    async fn free_candidate_is_attempted_before_paid() {
        let health = HealthStore::new();
        let quota = QuotaTracker::new();
        let candidates = vec![
            candidate("paid1", false, 50, 0.001),
            candidate("free1", true, 200, 0.0),
        ];
        let policy = RoutingScorePolicy::default();
        let (winner, provider_key) = Orchestrator::run(
            &health,
            &quota,
            candidates,
            &policy,
            &[],
            None,
            |p| async move { Ok::<_, AttemptError>(p.name.clone()) },
        )
        .await
        .unwrap();
        assert_eq!(winner, "free1");
        assert_eq!(provider_key, "free1");
    }

    #[tokio::test]
    async fn falls_back_to_next_candidate_on_rate_limit() {
        let health = HealthStore::new();
        let quota = QuotaTracker::new();
        let candidates = vec![
            candidate("free1", true, 200, 0.0),
            candidate("paid1", false, 50, 0.001),
        ];
        let policy = RoutingScorePolicy::default();
        let calls = AtomicU32::new(0);
        let (winner, provider_key) = Orchestrator::run(
            &health,
            &quota,
            candidates,
            &policy,
            &[],
            None,
            |p| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if p.name == "free1" {
                        Err(AttemptError {
                            kind: AttemptErrorKind::RateLimit,
                            message: "429".to_string(),
                        })
                    } else {
                        Ok::<_, AttemptError>("ok".to_string())
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(winner, "ok");
        assert_eq!(provider_key, "paid1");
        assert!(!health.is_healthy("free1"));
    }

    #[tokio::test]
    async fn all_unhealthy_exhausts_with_no_providers_available() {
        let health = HealthStore::new();
        let quota = QuotaTracker::new();
        health.mark_failure("free1", Some(Duration::from_secs(60)));
        health.mark_failure("paid1", Some(Duration::from_secs(60)));
        let candidates = vec![candidate("free1", true, 200, 0.0), candidate("paid1", false, 50, 0.001)];
        let policy = RoutingScorePolicy::default();
        let result: Result<(String, String), _> = Orchestrator::run(
            &health,
            &quota,
            candidates,
            &policy,
            &[],
            None,
            |p| async move { Ok(p.name.clone()) },
        )
        .await;
        assert!(matches!(result, Err(OrchestrationError::Exhausted { .. })));
    }
}
