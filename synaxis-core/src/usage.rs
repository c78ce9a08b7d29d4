//! # Usage Recorder
//!
//! Append-only log of completed requests. Persists asynchronously with
//! best-effort at-most-once delivery: records are buffered in-process (an
//! `N=1024`-deep ring) and handed to a durable sink by a background drain
//! task. On overflow the oldest record is dropped and a counter
//! incremented, rather than applying backpressure to request handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

const DEFAULT_CAPACITY: usize = 1024;
/// Records older than this are pruned by the daily cleanup sweep.
pub const RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub request_id: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub api_key_id: Option<String>,
    pub requested_model: String,
    pub resolved_provider: String,
    pub resolved_model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_cents: f64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub error_kind: Option<String>,
}

/// A durable sink for [`UsageRecord`]s. The in-memory default satisfies
/// this trivially; a `SYNAXIS_DB_DSN`-backed implementation lives in the
/// gateway crate.
#[async_trait::async_trait]
pub trait UsageSink: Send + Sync {
    async fn persist(&self, records: Vec<UsageRecord>);
    async fn prune_older_than(&self, cutoff: DateTime<Utc>);
}

struct Buffer {
    records: VecDeque<UsageRecord>,
    dropped: u64,
}

/// Shared handle passed through the request pipeline; owned by the core,
/// never handed out to adapters.
pub struct UsageRecorder {
    buffer: Mutex<Buffer>,
    capacity: usize,
    notify: Notify,
}

impl UsageRecorder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(Buffer {
                records: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Enqueues `record`, dropping the oldest entry on overflow. Called
    /// after every completed request regardless of outcome.
    pub fn record_usage(&self, record: UsageRecord) {
        let mut buffer = self.buffer.lock().expect("usage buffer poisoned");
        if buffer.records.len() >= self.capacity {
            buffer.records.pop_front();
            buffer.dropped += 1;
        }
        buffer.records.push_back(record);
        drop(buffer);
        self.notify.notify_one();
    }

    pub fn dropped_count(&self) -> u64 {
        self.buffer.lock().expect("usage buffer poisoned").dropped
    }

    /// Drains everything currently buffered. The background drain task
    /// calls this on a timer and hands the batch to a [`UsageSink`].
    pub fn drain(&self) -> Vec<UsageRecord> {
        let mut buffer = self.buffer.lock().expect("usage buffer poisoned");
        buffer.records.drain(..).collect()
    }

    /// Runs the drain loop until cancelled. Flushes on `interval` and
    /// whenever [`UsageRecorder::record_usage`] wakes it, whichever comes
    /// first, so a quiet buffer doesn't wait a full tick to flush its
    /// first record.
    pub async fn run_drain_loop(&self, sink: &dyn UsageSink, interval: std::time::Duration) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.notify.notified() => {}
            }
            let batch = self.drain();
            if !batch.is_empty() {
                sink.persist(batch).await;
            }
        }
    }
}

impl Default for UsageRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory [`UsageSink`] used by tests and by deployments that run
/// without `SYNAXIS_DB_DSN` set.
#[derive(Default)]
pub struct InMemoryUsageSink {
    records: Mutex<Vec<UsageRecord>>,
}

#[async_trait::async_trait]
impl UsageSink for InMemoryUsageSink {
    async fn persist(&self, mut records: Vec<UsageRecord>) {
        self.records.lock().expect("sink poisoned").append(&mut records);
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) {
        self.records
            .lock()
            .expect("sink poisoned")
            .retain(|r| r.started_at >= cutoff);
    }
}

impl InMemoryUsageSink {
    pub fn len(&self) -> usize {
        self.records.lock().expect("sink poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> UsageRecord {
        UsageRecord {
            request_id: id.to_string(),
            tenant_id: "tenant-a".to_string(),
            user_id: None,
            api_key_id: None,
            requested_model: "m".to_string(),
            resolved_provider: "free1".to_string(),
            resolved_model: "m-upstream".to_string(),
            input_tokens: 10,
            output_tokens: 5,
            cost_cents: 0.0,
            started_at: Utc::now(),
            duration_ms: 12,
            success: true,
            error_kind: None,
        }
    }

    #[test]
    fn overflow_drops_oldest_and_counts_it() {
        let recorder = UsageRecorder::with_capacity(2);
        recorder.record_usage(record("1"));
        recorder.record_usage(record("2"));
        recorder.record_usage(record("3"));
        let drained = recorder.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].request_id, "2");
        assert_eq!(recorder.dropped_count(), 1);
    }

    #[tokio::test]
    async fn drain_hands_records_to_sink() {
        let recorder = UsageRecorder::new();
        recorder.record_usage(record("1"));
        let sink = InMemoryUsageSink::default();
        sink.persist(recorder.drain()).await;
        assert_eq!(sink.len(), 1);
    }
}
