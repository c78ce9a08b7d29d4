//! # Health Store
//!
//! Tracks per-provider success/failure counters and a cooldown window.
//! `markFailure` applies exponential backoff (30s, 60s, 120s, ... capped at
//! 10 minutes after 5 consecutive failures); `markSuccess` resets the
//! streak and closes any open cooldown immediately.
//!
//! Backed by a `DashMap` keyed by provider key so read-modify-write on one
//! provider's record never takes a lock that spans another provider's.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Cooldown applied after the first consecutive failure.
pub const BASE_COOLDOWN: Duration = Duration::from_secs(30);
/// Cooldown never grows past this, regardless of streak length.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub success_count: u64,
    pub failure_count: u64,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            last_failure_at: None,
            cooldown_until: None,
            success_count: 0,
            failure_count: 0,
        }
    }
}

impl HealthRecord {
    /// Derived: a provider is healthy once `now >= cooldown_until`.
    pub fn is_healthy_at(&self, now: DateTime<Utc>) -> bool {
        match self.cooldown_until {
            Some(until) => now >= until,
            None => true,
        }
    }
}

/// Exponential backoff with a cap, per streak length. Streak 1 -> 30s,
/// streak 2 -> 60s, ... streak >= 5 -> capped at 10 minutes.
fn cooldown_for_streak(streak: u32) -> Duration {
    let exponent = streak.saturating_sub(1).min(31);
    let secs = BASE_COOLDOWN.as_secs().saturating_mul(1u64 << exponent);
    Duration::from_secs(secs).min(MAX_COOLDOWN)
}

/// Shared, mutated by the request pipeline and by a background expiry
/// sweep; never handed out to provider adapters.
#[derive(Default)]
pub struct HealthStore {
    records: DashMap<String, HealthRecord>,
}

impl HealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_healthy(&self, provider_key: &str) -> bool {
        self.is_healthy_at(provider_key, Utc::now())
    }

    fn is_healthy_at(&self, provider_key: &str, now: DateTime<Utc>) -> bool {
        self.records
            .get(provider_key)
            .map(|record| record.is_healthy_at(now))
            .unwrap_or(true)
    }

    pub fn mark_success(&self, provider_key: &str) {
        let mut record = self.records.entry(provider_key.to_string()).or_default();
        record.consecutive_failures = 0;
        record.cooldown_until = None;
        record.success_count += 1;
    }

    /// Records a failure and opens a cooldown window. `override_cooldown`
    /// lets callers (and tests) pin the window instead of deriving it from
    /// the streak length; pass `None` for the default exponential policy.
    pub fn mark_failure(&self, provider_key: &str, override_cooldown: Option<Duration>) {
        let now = Utc::now();
        let mut record = self.records.entry(provider_key.to_string()).or_default();
        record.consecutive_failures += 1;
        record.failure_count += 1;
        record.last_failure_at = Some(now);
        let cooldown = override_cooldown.unwrap_or_else(|| cooldown_for_streak(record.consecutive_failures));
        record.cooldown_until = Some(now + chrono::Duration::from_std(cooldown).unwrap_or_default());
    }

    pub fn record_for(&self, provider_key: &str) -> HealthRecord {
        self.records.get(provider_key).map(|r| r.clone()).unwrap_or_default()
    }

    /// True if at least one tracked provider is currently healthy; used by
    /// the `/health/readiness` probe.
    pub fn any_healthy(&self, known_providers: &[String]) -> bool {
        known_providers.iter().any(|key| self.is_healthy(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_healthy_by_default() {
        let store = HealthStore::new();
        assert!(store.is_healthy("never-seen"));
    }

    #[test]
    fn failure_opens_cooldown_then_clears() {
        let store = HealthStore::new();
        let now = Utc::now();
        store.mark_failure("p", Some(Duration::from_secs(30)));
        assert!(!store.is_healthy_at("p", now));
        assert!(store.is_healthy_at("p", now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn success_within_cooldown_restores_health() {
        let store = HealthStore::new();
        store.mark_failure("p", Some(Duration::from_secs(30)));
        assert!(!store.is_healthy("p"));
        store.mark_success("p");
        assert!(store.is_healthy("p"));
    }

    #[test]
    fn backoff_grows_then_caps() {
        assert_eq!(cooldown_for_streak(1), Duration::from_secs(30));
        assert_eq!(cooldown_for_streak(2), Duration::from_secs(60));
        assert_eq!(cooldown_for_streak(5), Duration::from_secs(480));
        assert_eq!(cooldown_for_streak(9), MAX_COOLDOWN);
    }
}
