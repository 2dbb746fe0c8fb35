// Simulated backend for local runs
//
// Provides a synthetic data source and a change publisher so the binary can
// drive the full orchestrator without a real backend:
// - `SyntheticSource` returns plausible records for every domain
// - `spawn_activity` publishes change notifications on random topics

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::trace;

use crate::monitoring::source::{
    BucketUsage, DocumentRecord, DocumentState, FunctionStats, MessageRecord, SecurityEvent,
    SecurityEventKind, UserRecord,
};
use crate::monitoring::{DataSource, Domain, FetchWindow, FetchedBatch, RawBatch};
use crate::realtime::InMemoryChangeBus;
use crate::scheduler::PeriodicTask;

const EDGE_FUNCTIONS: [&str; 4] = ["send-invite", "resize-image", "notify-slack", "export-report"];
const BUCKETS: [&str; 3] = ["avatars", "documents", "exports"];

/// Data source producing random but plausible records
pub struct SyntheticSource {
    rng: Mutex<fastrand::Rng>,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticSource {
    /// Source seeded from entropy
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Deterministic source
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }

    /// Generate a batch for `domain` within `window`
    pub fn generate(&self, domain: Domain, window: &FetchWindow) -> RawBatch {
        let mut guard = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let rng: &mut fastrand::Rng = &mut guard;
        let now = Utc::now();
        let span_secs = (now - window.since).num_seconds().max(1);
        let within = |rng: &mut fastrand::Rng| now - ChronoDuration::seconds(rng.i64(0..span_secs));
        let rows = window.row_cap.max(1);

        match domain {
            Domain::Documents => RawBatch::Documents(
                (0..rng.usize(1..=rows))
                    .map(|_| DocumentRecord {
                        id: uuid::Uuid::new_v4().to_string(),
                        state: match rng.u8(0..100) {
                            0..=3 => DocumentState::Failed,
                            4..=14 => DocumentState::Pending,
                            _ => DocumentState::Processed,
                        },
                        created_at: within(rng),
                    })
                    .collect(),
            ),
            Domain::Messages => RawBatch::Messages(
                (0..rng.usize(1..=rows))
                    .map(|_| MessageRecord {
                        id: uuid::Uuid::new_v4().to_string(),
                        delivered: rng.u8(0..100) >= 3,
                        sent_at: within(rng),
                    })
                    .collect(),
            ),
            Domain::Storage => RawBatch::Storage(
                BUCKETS
                    .iter()
                    .map(|bucket| {
                        let quota_bytes = 10 * 1024 * 1024 * 1024u64;
                        BucketUsage {
                            bucket: bucket.to_string(),
                            used_bytes: rng.u64(0..=quota_bytes),
                            quota_bytes,
                            object_count: rng.u64(0..50_000),
                        }
                    })
                    .collect(),
            ),
            Domain::Users => RawBatch::Users(
                (0..rng.usize(1..=rows))
                    .map(|_| UserRecord {
                        id: uuid::Uuid::new_v4().to_string(),
                        created_at: now - ChronoDuration::hours(rng.i64(0..24 * 90)),
                        last_active_at: rng.bool().then(|| within(rng)),
                        locked: rng.u8(0..100) < 2,
                    })
                    .collect(),
            ),
            Domain::Security => RawBatch::Security(
                (0..rng.usize(0..=rows))
                    .map(|_| SecurityEvent {
                        kind: match rng.u8(0..100) {
                            0..=79 => SecurityEventKind::FailedLogin,
                            80..=89 => SecurityEventKind::SuspiciousActivity,
                            _ => SecurityEventKind::PolicyViolation,
                        },
                        occurred_at: within(rng),
                        actor: rng.bool().then(|| format!("user-{}", rng.u16(1..500))),
                    })
                    .collect(),
            ),
            Domain::EdgeFunctions => RawBatch::EdgeFunctions(
                EDGE_FUNCTIONS
                    .iter()
                    .map(|function| FunctionStats {
                        function: function.to_string(),
                        invocations: rng.u64(0..500),
                        error_rate: rng.f64() * 12.0,
                        avg_duration_ms: 20.0 + rng.f64() * 400.0,
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl DataSource for SyntheticSource {
    async fn fetch(&self, domain: Domain, window: &FetchWindow) -> Result<FetchedBatch> {
        let batch = self.generate(domain, window);
        trace!(%domain, records = batch.len(), "Synthetic fetch");
        Ok(FetchedBatch::complete(batch))
    }
}

/// Publish one change on a random monitored topic every `interval`
pub fn spawn_activity(bus: Arc<InMemoryChangeBus>, interval: Duration) -> PeriodicTask {
    let rng = Arc::new(Mutex::new(fastrand::Rng::new()));
    PeriodicTask::spawn("simulated-activity", interval, move || {
        let bus = bus.clone();
        let rng = rng.clone();
        async move {
            let topic = {
                let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
                let domain = Domain::ALL[rng.usize(..Domain::ALL.len())];
                let topics = domain.topics();
                topics[rng.usize(..topics.len())]
            };
            let reached = bus.publish(topic);
            trace!(topic, reached, "Simulated change");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::DomainRules;
    use crate::realtime::{topic_set, ChangeSource, NotificationSink};

    #[tokio::test]
    async fn test_synthetic_batches_match_domain() {
        let source = SyntheticSource::with_seed(7);
        let window = FetchWindow::ending_at(Utc::now(), Duration::from_secs(24 * 3600), 50);

        for domain in Domain::ALL {
            let fetched = source.fetch(domain, &window).await.unwrap();
            assert_eq!(fetched.batch.domain(), domain);
            assert!(!fetched.partial);
            assert!(fetched.batch.len() <= 50);
        }
    }

    #[test]
    fn test_synthetic_records_inside_window() {
        let source = SyntheticSource::with_seed(11);
        let window = FetchWindow::ending_at(Utc::now(), Duration::from_secs(3600), 20);

        if let RawBatch::Messages(messages) = source.generate(Domain::Messages, &window) {
            assert!(messages.iter().all(|m| m.sent_at >= window.since));
        } else {
            panic!("expected messages");
        }
    }

    #[test]
    fn test_synthetic_batches_evaluate() {
        let source = SyntheticSource::with_seed(3);
        let window = FetchWindow::ending_at(Utc::now(), Duration::from_secs(24 * 3600), 50);
        let rules = DomainRules::default();

        let eval = rules.evaluate(&source.generate(Domain::EdgeFunctions, &window), Utc::now());
        let rate = eval.metrics["error_rate"];
        assert!((0.0..=12.0).contains(&rate));
        assert_eq!(eval.metrics["function_count"], 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_publishes_to_subscribers() {
        let bus = Arc::new(InMemoryChangeBus::new());
        let (sink, mut rx) = NotificationSink::channel();
        let all: Vec<&str> = Domain::ALL.iter().flat_map(|d| d.topics().iter().copied()).collect();
        bus.subscribe(&topic_set(all), sink).await.unwrap();

        let task = spawn_activity(bus.clone(), Duration::from_millis(100));
        let first = rx.recv().await.unwrap();
        assert!(Domain::ALL
            .iter()
            .any(|d| d.topics().contains(&first.topic.as_str())));

        task.cancel().await;
    }
}
