//! # Quota Tracker
//!
//! Per-provider RPM/TPM admission using fixed-window counters over a
//! sliding 60 second horizon. Counters are approximate by design — the
//! invariant is "no provider admitted more than R requests in any strict
//! 60s window by more than a bounded (~10%) overshoot" rather than an exact
//! sliding log, which would cost a lock per request per provider.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

const WINDOW: Duration = Duration::from_secs(60);
/// Quota is reported as "approaching limit" once utilisation crosses this.
const WARNING_UTILISATION: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Deny,
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaStatus {
    pub admission: Admission,
    /// True once either RPM or TPM utilisation crosses the warning
    /// threshold; consulted by C6 as a scoring signal, never blocking.
    pub warning: bool,
    pub requests_in_window: u64,
    pub tokens_in_window: u64,
}

#[derive(Debug, Clone)]
struct Bucket {
    window_start: DateTime<Utc>,
    requests_in_window: u64,
    tokens_in_window: u64,
}

impl Bucket {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            requests_in_window: 0,
            tokens_in_window: 0,
        }
    }

    fn roll_if_expired(&mut self, now: DateTime<Utc>) {
        let elapsed = now - self.window_start;
        if elapsed >= chrono::Duration::from_std(WINDOW).unwrap_or_default() {
            self.window_start = now;
            self.requests_in_window = 0;
            self.tokens_in_window = 0;
        }
    }
}

/// Shared, mutated by the request pipeline; keyed by provider key so one
/// provider's read-modify-write never locks another's.
#[derive(Default)]
pub struct QuotaTracker {
    buckets: DashMap<String, Bucket>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consulted before each attempt. `rate_limit_rpm`/`rate_limit_tpm` of
    /// `None` mean "unbounded" for that dimension.
    pub fn check_quota(
        &self,
        provider_key: &str,
        rate_limit_rpm: Option<u32>,
        rate_limit_tpm: Option<u32>,
    ) -> QuotaStatus {
        let now = Utc::now();
        let mut bucket = self
            .buckets
            .entry(provider_key.to_string())
            .or_insert_with(|| Bucket::fresh(now));
        bucket.roll_if_expired(now);

        let rpm_denied = rate_limit_rpm
            .map(|limit| bucket.requests_in_window >= limit as u64)
            .unwrap_or(false);
        let tpm_denied = rate_limit_tpm
            .map(|limit| bucket.tokens_in_window >= limit as u64)
            .unwrap_or(false);

        let rpm_warning = rate_limit_rpm
            .map(|limit| bucket.requests_in_window as f64 >= limit as f64 * WARNING_UTILISATION)
            .unwrap_or(false);
        let tpm_warning = rate_limit_tpm
            .map(|limit| bucket.tokens_in_window as f64 >= limit as f64 * WARNING_UTILISATION)
            .unwrap_or(false);

        QuotaStatus {
            admission: if rpm_denied || tpm_denied {
                Admission::Deny
            } else {
                Admission::Admit
            },
            warning: rpm_warning || tpm_warning,
            requests_in_window: bucket.requests_in_window,
            tokens_in_window: bucket.tokens_in_window,
        }
    }

    /// Appends a completed attempt to the sliding window. Called once an
    /// attempt finishes, admitted or not — denied attempts never reach
    /// here since no upstream call was made.
    pub fn record_usage(&self, provider_key: &str, input_tokens: u64, output_tokens: u64) {
        let now = Utc::now();
        let mut bucket = self
            .buckets
            .entry(provider_key.to_string())
            .or_insert_with(|| Bucket::fresh(now));
        bucket.roll_if_expired(now);
        bucket.requests_in_window += 1;
        bucket.tokens_in_window += input_tokens + output_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixth_request_within_window_is_denied() {
        let tracker = QuotaTracker::new();
        for _ in 0..5 {
            let status = tracker.check_quota("p", Some(5), None);
            assert_eq!(status.admission, Admission::Admit);
            tracker.record_usage("p", 10, 10);
        }
        let status = tracker.check_quota("p", Some(5), None);
        assert_eq!(status.admission, Admission::Deny);
    }

    #[test]
    fn unbounded_provider_always_admits() {
        let tracker = QuotaTracker::new();
        for _ in 0..100 {
            tracker.record_usage("p", 1, 1);
        }
        assert_eq!(
            tracker.check_quota("p", None, None).admission,
            Admission::Admit
        );
    }

    #[test]
    fn warning_flag_trips_before_denial() {
        let tracker = QuotaTracker::new();
        for _ in 0..4 {
            tracker.record_usage("p", 0, 0);
        }
        let status = tracker.check_quota("p", Some(5), None);
        assert!(status.warning);
        assert_eq!(status.admission, Admission::Admit);
    }
}
