//! Windowed Rate Limiter
//!
//! Central entry point for per-actor admission control.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::config::{ActionPolicy, RateLimitConfig};
use super::report::LimiterReport;
use super::store::LimiterRegistry;
use super::window::{Decision, LimitKey};
use crate::error::MonitorError;
use crate::metrics;
use crate::scheduler::PeriodicTask;

/// Windowed rate limiter
///
/// Cheap to clone; clones share one registry. Construct one per tenant or
/// session that needs isolated counters.
#[derive(Debug, Clone)]
pub struct WindowedRateLimiter {
    /// Configuration
    config: Arc<RwLock<RateLimitConfig>>,

    /// Counter registry
    registry: LimiterRegistry,
}

impl WindowedRateLimiter {
    /// Create a limiter with its own registry
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_registry(config, LimiterRegistry::new())
    }

    /// Create a limiter over an existing registry
    pub fn with_registry(config: RateLimitConfig, registry: LimiterRegistry) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            registry,
        }
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Create a disabled limiter (for testing)
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    /// Check and count one request for `key`
    ///
    /// Unknown keys are treated as fresh. Never fails.
    pub fn check_limit(&self, key: &LimitKey, max_requests: u32, window: Duration) -> Decision {
        self.check_limit_at(key, max_requests, window, Instant::now())
    }

    /// Check and count one request for `key` at an explicit instant
    pub fn check_limit_at(
        &self,
        key: &LimitKey,
        max_requests: u32,
        window: Duration,
        now: Instant,
    ) -> Decision {
        if !self.is_enabled() {
            return Decision::unlimited();
        }

        let decision = self.registry.check(key, max_requests.max(1), window, now);

        if decision.allowed {
            debug!(key = %key, count = decision.count, "Admission allowed");
            metrics::RATE_LIMIT_DECISIONS_TOTAL
                .with_label_values(&["allowed"])
                .inc();
        } else {
            info!(
                key = %key,
                reset_in_secs = decision.reset_in.map(|d| d.as_secs()).unwrap_or_default(),
                "Admission denied"
            );
            metrics::RATE_LIMIT_DECISIONS_TOTAL
                .with_label_values(&["denied"])
                .inc();
        }
        metrics::RATE_LIMIT_TRACKED_KEYS.set(self.registry.len() as i64);

        decision
    }

    /// Check an action for an actor and resource using the configured policy
    pub fn check_action(&self, action: &str, actor: &str, resource: &str) -> Decision {
        let policy = self.policy_for(action);
        let key = LimitKey::new(action, actor, resource);
        self.check_limit(&key, policy.max_requests, policy.window)
    }

    /// Like [`check_action`](Self::check_action), but denial is an error
    pub fn admit(&self, action: &str, actor: &str, resource: &str) -> Result<(), MonitorError> {
        let decision = self.check_action(action, actor, resource);
        if decision.allowed {
            Ok(())
        } else {
            Err(MonitorError::AdmissionDenied {
                key: LimitKey::new(action, actor, resource).to_string(),
                reset_in: decision.reset_in.unwrap_or_default(),
            })
        }
    }

    /// Policy configured for an action
    pub fn policy_for(&self, action: &str) -> ActionPolicy {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .policy_for(action)
    }

    /// Remove entries whose window has expired
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// Remove entries whose window has expired at `now`
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let removed = self.registry.sweep_expired(now);
        if removed > 0 {
            debug!(
                removed,
                remaining = self.registry.len(),
                "Swept expired rate limit entries"
            );
            metrics::RATE_LIMIT_SWEPT_TOTAL.inc_by(removed as u64);
        }
        metrics::RATE_LIMIT_TRACKED_KEYS.set(self.registry.len() as i64);
        removed
    }

    /// Start the background cleanup sweep on the configured interval
    pub fn spawn_cleanup(&self) -> PeriodicTask {
        let interval = self.get_config().cleanup_interval();
        self.spawn_cleanup_every(interval)
    }

    /// Start the background cleanup sweep on an explicit interval
    pub fn spawn_cleanup_every(&self, interval: Duration) -> PeriodicTask {
        info!("Starting rate limit cleanup every {:?}", interval);
        let limiter = self.clone();
        PeriodicTask::spawn("rate-limit-cleanup", interval, move || {
            let limiter = limiter.clone();
            async move {
                limiter.sweep_expired();
            }
        })
    }

    /// Number of tracked keys
    pub fn tracked_keys(&self) -> usize {
        self.registry.len()
    }

    /// Build a usage report
    pub fn report(&self) -> LimiterReport {
        LimiterReport::from_registry(&self.registry, Instant::now())
    }

    /// Whether limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .enabled
    }

    /// Replace the configuration
    pub fn update_config(&self, config: RateLimitConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Current configuration
    pub fn get_config(&self) -> RateLimitConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
