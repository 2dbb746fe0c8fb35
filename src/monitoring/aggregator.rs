//! Metric Aggregator
//!
//! Pulls raw records for one domain, derives its metrics and status, and
//! publishes the result as an immutable [`MetricSnapshot`].
//!
//! Refreshes for one aggregator are serialized: a refresh requested while
//! another is in flight waits for it to finish and then runs with fresh data.
//! Every refresh takes a sequence number, and publication only ever moves the
//! exposed snapshot forward, so an older fetch can never overwrite a newer one.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use super::domain::Domain;
use super::rules::DomainRules;
use super::snapshot::MetricSnapshot;
use super::source::{DataSource, FetchWindow};
use crate::config::MonitoringConfig;
use crate::error::{MonitorError, Result};
use crate::metrics;

/// Fetch bounds for one aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    /// How far back records are relevant
    pub lookback: Duration,

    /// Maximum rows requested per fetch
    pub row_cap: usize,

    /// Upper bound on a single fetch
    pub fetch_timeout: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(24 * 3600),
            row_cap: 50,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

impl AggregatorSettings {
    /// Settings from the monitoring configuration section
    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self {
            lookback: config.lookback(),
            row_cap: config.row_cap,
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// Computes and publishes snapshots for one domain
pub struct MetricAggregator {
    domain: Domain,
    source: Arc<dyn DataSource>,
    rules: Arc<DomainRules>,
    settings: AggregatorSettings,
    /// Held for the whole of a refresh
    flight: Mutex<()>,
    sequence: AtomicU64,
    published: watch::Sender<Option<Arc<MetricSnapshot>>>,
}

impl MetricAggregator {
    /// Create an aggregator with no snapshot yet
    pub fn new(
        domain: Domain,
        source: Arc<dyn DataSource>,
        rules: Arc<DomainRules>,
        settings: AggregatorSettings,
    ) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            domain,
            source,
            rules,
            settings,
            flight: Mutex::new(()),
            sequence: AtomicU64::new(0),
            published,
        }
    }

    /// Domain this aggregator computes
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Last completed snapshot, if any
    ///
    /// Never waits on an in-flight refresh.
    pub fn current(&self) -> Option<Arc<MetricSnapshot>> {
        self.published.borrow().clone()
    }

    /// Receiver notified whenever the exposed snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<MetricSnapshot>>> {
        self.published.subscribe()
    }

    /// Number of refreshes started so far
    pub fn refreshes_started(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Refresh, swallowing failures
    ///
    /// On failure the previous snapshot is kept and marked stale, and is
    /// returned. Returns `None` only if no refresh has ever succeeded.
    pub async fn refresh(&self) -> Option<Arc<MetricSnapshot>> {
        match self.try_refresh().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(domain = %self.domain, error = %e, "Refresh failed, keeping previous snapshot");
                self.current()
            }
        }
    }

    /// Refresh, surfacing the failure
    pub async fn try_refresh(&self) -> Result<Arc<MetricSnapshot>> {
        let _flight = self.flight.lock().await;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        let label = self.domain.as_str();

        let result = self.compute(sequence).await;
        metrics::SNAPSHOT_REFRESH_DURATION_SECONDS
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(snapshot) => {
                let outcome = if snapshot.stale { "partial" } else { "ok" };
                metrics::SNAPSHOT_REFRESH_TOTAL
                    .with_label_values(&[label, outcome])
                    .inc();
                metrics::DOMAIN_STATUS
                    .with_label_values(&[label])
                    .set(i64::from(snapshot.status.severity()));

                self.publish(snapshot.clone());
                debug!(
                    domain = %self.domain,
                    sequence,
                    status = %snapshot.status,
                    stale = snapshot.stale,
                    "Snapshot refreshed"
                );
                Ok(snapshot)
            }
            Err(e) => {
                metrics::SNAPSHOT_REFRESH_TOTAL
                    .with_label_values(&[label, "error"])
                    .inc();
                self.mark_stale();
                Err(e)
            }
        }
    }

    async fn compute(&self, sequence: u64) -> Result<Arc<MetricSnapshot>> {
        let window = FetchWindow::ending_at(Utc::now(), self.settings.lookback, self.settings.row_cap);

        let fetched = match time::timeout(
            self.settings.fetch_timeout,
            self.source.fetch(self.domain, &window),
        )
        .await
        {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) => {
                return Err(MonitorError::FetchFailure {
                    domain: self.domain,
                    reason: format!("{:#}", e),
                })
            }
            Err(_) => {
                return Err(MonitorError::FetchFailure {
                    domain: self.domain,
                    reason: format!("fetch timed out after {:?}", self.settings.fetch_timeout),
                })
            }
        };

        let returned = fetched.batch.domain();
        if returned != self.domain {
            return Err(MonitorError::FetchFailure {
                domain: self.domain,
                reason: format!("expected {} records, got {}", self.domain, returned),
            });
        }

        let computed_at = Utc::now();
        let evaluation = self.rules.evaluate(&fetched.batch, computed_at);

        Ok(Arc::new(MetricSnapshot {
            domain: self.domain,
            metrics: evaluation.metrics,
            status: evaluation.status,
            computed_at,
            stale: fetched.partial,
            sequence,
        }))
    }

    /// Expose `snapshot` unless a newer one is already exposed
    fn publish(&self, snapshot: Arc<MetricSnapshot>) -> bool {
        self.published.send_if_modified(|current| {
            let newer = current
                .as_ref()
                .map_or(true, |existing| snapshot.sequence > existing.sequence);
            if newer {
                *current = Some(snapshot.clone());
            }
            newer
        })
    }

    fn mark_stale(&self) {
        self.published.send_if_modified(|current| match current {
            Some(existing) if !existing.stale => {
                *current = Some(Arc::new(existing.as_stale()));
                true
            }
            _ => false,
        });
    }
}

impl std::fmt::Debug for MetricAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricAggregator")
            .field("domain", &self.domain)
            .field("settings", &self.settings)
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::domain::Status;
    use crate::monitoring::source::{FetchedBatch, FunctionStats, RawBatch};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, VecDeque};
    use tokio::sync::Notify;

    enum Step {
        Return(FetchedBatch),
        Fail(&'static str),
        Hang,
        Gated(Arc<Notify>, FetchedBatch),
    }

    #[derive(Default)]
    struct ScriptedSource {
        steps: std::sync::Mutex<VecDeque<Step>>,
        windows: std::sync::Mutex<Vec<FetchWindow>>,
    }

    impl ScriptedSource {
        fn push(&self, step: Step) {
            self.steps.lock().unwrap().push_back(step);
        }
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        async fn fetch(&self, _domain: Domain, window: &FetchWindow) -> anyhow::Result<FetchedBatch> {
            self.windows.lock().unwrap().push(*window);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Return(batch)) => Ok(batch),
                Some(Step::Fail(reason)) => Err(anyhow::anyhow!(reason)),
                Some(Step::Hang) => std::future::pending().await,
                Some(Step::Gated(gate, batch)) => {
                    gate.notified().await;
                    Ok(batch)
                }
                None => Err(anyhow::anyhow!("script exhausted")),
            }
        }
    }

    fn edge(stats: &[(u64, f64)]) -> FetchedBatch {
        FetchedBatch::complete(RawBatch::EdgeFunctions(
            stats
                .iter()
                .enumerate()
                .map(|(i, (invocations, error_rate))| FunctionStats {
                    function: format!("fn-{}", i),
                    invocations: *invocations,
                    error_rate: *error_rate,
                    avg_duration_ms: 120.0,
                })
                .collect(),
        ))
    }

    fn aggregator(source: Arc<ScriptedSource>) -> MetricAggregator {
        MetricAggregator::new(
            Domain::EdgeFunctions,
            source,
            Arc::new(DomainRules::default()),
            AggregatorSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_refresh_publishes_snapshot() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Step::Return(edge(&[(45, 2.2), (12, 8.3)])));
        let agg = aggregator(source.clone());

        assert!(agg.current().is_none());
        let snap = agg.try_refresh().await.unwrap();

        assert_eq!(snap.status, Status::Healthy);
        assert_eq!(snap.sequence, 1);
        assert!(!snap.stale);
        assert!((snap.metric("error_rate").unwrap() - 3.48).abs() < 0.01);
        assert_eq!(agg.current().unwrap().sequence, 1);

        let windows = source.windows.lock().unwrap();
        assert_eq!(windows[0].row_cap, 50);
        assert_eq!(windows[0].lookback, Duration::from_secs(24 * 3600));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_snapshot() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Step::Return(edge(&[(100, 1.0)])));
        source.push(Step::Fail("connection reset"));
        let agg = aggregator(source);

        let first = agg.refresh().await.unwrap();
        assert!(!first.stale);

        let err = agg.try_refresh().await.unwrap_err();
        assert!(matches!(err, MonitorError::FetchFailure { domain: Domain::EdgeFunctions, .. }));

        let kept = agg.current().unwrap();
        assert!(kept.stale);
        assert_eq!(kept.metrics, first.metrics);
        assert_eq!(kept.sequence, first.sequence);
    }

    #[tokio::test]
    async fn test_refresh_swallows_failure() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Step::Fail("unavailable"));
        let agg = aggregator(source);

        assert!(agg.refresh().await.is_none());
        assert!(agg.current().is_none());
        assert_eq!(agg.refreshes_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_is_recoverable() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Step::Return(edge(&[(10, 0.0)])));
        source.push(Step::Hang);
        source.push(Step::Return(edge(&[(10, 20.0)])));
        let agg = aggregator(source);

        agg.refresh().await.unwrap();

        let err = agg.try_refresh().await.unwrap_err();
        assert_eq!(
            err,
            MonitorError::FetchFailure {
                domain: Domain::EdgeFunctions,
                reason: "fetch timed out after 5s".to_string(),
            }
        );
        assert!(agg.current().unwrap().stale);

        let snap = agg.try_refresh().await.unwrap();
        assert_eq!(snap.status, Status::Down);
        assert_eq!(snap.sequence, 3);
        assert!(!agg.current().unwrap().stale);
    }

    #[tokio::test]
    async fn test_partial_batch_marks_stale() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Step::Return(FetchedBatch::partial(RawBatch::EdgeFunctions(vec![]))));
        let agg = aggregator(source);

        let snap = agg.try_refresh().await.unwrap();
        assert!(snap.stale);
        assert_eq!(snap.metric("error_rate"), Some(0.0));
    }

    #[tokio::test]
    async fn test_wrong_kind_is_fetch_failure() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Step::Return(FetchedBatch::complete(RawBatch::Messages(vec![]))));
        let agg = aggregator(source);

        let err = agg.try_refresh().await.unwrap_err();
        assert!(err.to_string().contains("expected edge_functions records, got messages"));
    }

    #[tokio::test]
    async fn test_overlapping_refreshes_never_regress() {
        let source = Arc::new(ScriptedSource::default());
        let gate = Arc::new(Notify::new());
        source.push(Step::Gated(gate.clone(), edge(&[(10, 1.0)])));
        source.push(Step::Return(edge(&[(10, 7.0)])));
        let agg = Arc::new(aggregator(source));

        let first = tokio::spawn({
            let agg = agg.clone();
            async move { agg.try_refresh().await }
        });
        while agg.refreshes_started() < 1 {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn({
            let agg = agg.clone();
            async move { agg.try_refresh().await }
        });
        tokio::task::yield_now().await;

        // The second refresh is queued behind the first
        assert_eq!(agg.refreshes_started(), 1);
        gate.notify_one();

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);

        let exposed = agg.current().unwrap();
        assert_eq!(exposed.sequence, 2);
        assert_eq!(exposed.status, Status::Degraded);
    }

    #[tokio::test]
    async fn test_publish_rejects_older_sequence() {
        let agg = aggregator(Arc::new(ScriptedSource::default()));
        let snapshot = |sequence| {
            Arc::new(MetricSnapshot {
                domain: Domain::EdgeFunctions,
                metrics: BTreeMap::new(),
                status: Status::Healthy,
                computed_at: Utc::now(),
                stale: false,
                sequence,
            })
        };

        assert!(agg.publish(snapshot(2)));
        assert!(!agg.publish(snapshot(1)));
        assert!(!agg.publish(snapshot(2)));
        assert_eq!(agg.current().unwrap().sequence, 2);
        assert!(agg.publish(snapshot(3)));
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Step::Return(edge(&[(5, 0.0)])));
        let agg = aggregator(source);
        let mut rx = agg.subscribe();

        agg.refresh().await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().sequence, 1);
    }
}
