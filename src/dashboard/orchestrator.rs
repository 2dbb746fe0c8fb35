//! Dashboard Orchestrator
//!
//! Composes one [`ChangeMultiplexer`] over every monitored topic with one
//! [`MetricAggregator`] per domain.
//!
//! Two independent triggers request a full refresh: a coalesced change batch
//! from the multiplexer, and the fixed refresh cadence. Requests land on a
//! single pending flag, so any number of requests made while a refresh is
//! running collapse into one follow-up refresh.

use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::board::SnapshotBoard;
use crate::config::MonitoringConfig;
use crate::error::{MonitorError, Result};
use crate::monitoring::{
    AggregatorSettings, DataSource, Domain, DomainRules, MetricAggregator, MetricSnapshot,
};
use crate::realtime::{ChangeMultiplexer, ChangeSource, CoalescePolicy, MultiplexerState, Topic};
use crate::scheduler::PeriodicTask;

/// Orchestrator timing and fetch settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Fixed refresh cadence
    pub refresh_interval: Duration,

    /// Coalescing policy for change notifications
    pub coalesce: CoalescePolicy,

    /// Bound on establishing the change subscription
    pub subscribe_timeout: Duration,

    /// Per-aggregator fetch settings
    pub aggregator: AggregatorSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&MonitoringConfig::default())
    }
}

impl OrchestratorSettings {
    /// Settings from the monitoring configuration section
    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval(),
            coalesce: config.coalesce_policy(),
            subscribe_timeout: config.subscribe_timeout(),
            aggregator: AggregatorSettings::from_config(config),
        }
    }
}

/// Background tasks owned while running
struct Workers {
    cadence: PeriodicTask,
    refresher: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Owns the aggregators and the multiplexer for one dashboard session
pub struct DashboardOrchestrator {
    aggregators: Arc<BTreeMap<Domain, Arc<MetricAggregator>>>,
    multiplexer: ChangeMultiplexer,
    settings: OrchestratorSettings,
    pending: Arc<Notify>,
    workers: Mutex<Option<Workers>>,
}

impl DashboardOrchestrator {
    /// Create an orchestrator with the standard domain rules
    pub fn new(
        data: Arc<dyn DataSource>,
        changes: Arc<dyn ChangeSource>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self::with_rules(data, changes, settings, DomainRules::default())
    }

    /// Create an orchestrator with custom domain rules
    pub fn with_rules(
        data: Arc<dyn DataSource>,
        changes: Arc<dyn ChangeSource>,
        settings: OrchestratorSettings,
        rules: DomainRules,
    ) -> Self {
        let rules = Arc::new(rules);
        let aggregators = Domain::ALL
            .into_iter()
            .map(|domain| {
                let aggregator =
                    MetricAggregator::new(domain, data.clone(), rules.clone(), settings.aggregator);
                (domain, Arc::new(aggregator))
            })
            .collect();

        let multiplexer = ChangeMultiplexer::new(changes, settings.coalesce)
            .with_subscribe_timeout(settings.subscribe_timeout);

        Self {
            aggregators: Arc::new(aggregators),
            multiplexer,
            settings,
            pending: Arc::new(Notify::new()),
            workers: Mutex::new(None),
        }
    }

    /// Every topic feeding the dashboard
    pub fn topics() -> BTreeSet<Topic> {
        Domain::ALL
            .iter()
            .flat_map(|d| d.topics().iter().copied())
            .map(Topic::new)
            .collect()
    }

    /// Refresh every domain, start the cadence, then subscribe to changes
    ///
    /// A `SubscriptionFailure` is returned to the caller, but the cadence
    /// keeps the board refreshing without live updates.
    pub async fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            return Err(MonitorError::InvalidState {
                expected: "stopped",
                actual: "running",
            });
        }

        let refreshed = refresh_all(&self.aggregators).await;
        info!(refreshed, domains = self.aggregators.len(), "Initial refresh complete");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let refresher = tokio::spawn(run_refresher(
            self.aggregators.clone(),
            self.pending.clone(),
            shutdown_rx,
        ));

        let pending = self.pending.clone();
        let cadence = PeriodicTask::spawn("snapshot-refresh", self.settings.refresh_interval, move || {
            let pending = pending.clone();
            async move { pending.notify_one() }
        });

        *workers = Some(Workers {
            cadence,
            refresher,
            shutdown,
        });
        drop(workers);

        let pending = self.pending.clone();
        self.multiplexer
            .start(Self::topics(), move |batch| {
                debug!(notifications = batch.notifications, "Change batch received");
                pending.notify_one();
            })
            .await
            .inspect_err(|e| warn!(error = %e, "Live updates unavailable, continuing with polling"))
    }

    /// Refresh every domain now and wait for the results
    pub async fn refresh_now(&self) -> usize {
        refresh_all(&self.aggregators).await
    }

    /// Latest completed snapshot for `domain`
    pub fn current_snapshot(&self, domain: Domain) -> Option<Arc<MetricSnapshot>> {
        self.aggregators.get(&domain).and_then(|a| a.current())
    }

    /// Aggregator for `domain`
    pub fn aggregator(&self, domain: Domain) -> Option<&Arc<MetricAggregator>> {
        self.aggregators.get(&domain)
    }

    /// Read-only board for presentation code
    pub fn board(&self) -> SnapshotBoard {
        SnapshotBoard::new(
            self.aggregators
                .iter()
                .map(|(domain, aggregator)| (*domain, aggregator.subscribe()))
                .collect(),
        )
    }

    /// Lifecycle state of the change multiplexer
    pub fn live_updates(&self) -> MultiplexerState {
        self.multiplexer.state()
    }

    /// Settings in effect
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Stop live updates, then the cadence and the refresh worker
    ///
    /// Snapshots stay readable afterwards.
    pub async fn shutdown(&self) {
        if let Err(e) = self.multiplexer.stop().await {
            warn!(error = %e, "Multiplexer stop failed");
        }

        if let Some(workers) = self.workers.lock().await.take() {
            workers.cadence.cancel().await;
            let _ = workers.shutdown.send(true);
            if let Err(e) = workers.refresher.await {
                warn!(error = %e, "Refresh worker ended abnormally");
            }
        }
        info!("Dashboard orchestrator stopped");
    }
}

/// Refresh every aggregator concurrently; returns how many hold a snapshot
async fn refresh_all(aggregators: &BTreeMap<Domain, Arc<MetricAggregator>>) -> usize {
    join_all(aggregators.values().map(|aggregator| aggregator.refresh()))
        .await
        .into_iter()
        .filter(Option::is_some)
        .count()
}

async fn run_refresher(
    aggregators: Arc<BTreeMap<Domain, Arc<MetricAggregator>>>,
    pending: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = pending.notified() => {
                let refreshed = refresh_all(&aggregators).await;
                debug!(refreshed, "Refresh cycle complete");
            }
        }
    }
    debug!("Refresh worker stopped");
}
