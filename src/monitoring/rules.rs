//! Domain Metric Rules
//!
//! Pure functions from raw records to metric values and status. Every domain
//! classifies through the shared evaluators in [`super::bands`].

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::bands::{percent, weighted_error_rate, weighted_mean, PenaltyScore, ThresholdLadder, TieredPenalty};
use super::domain::{Domain, Status};
use super::source::{
    BucketUsage, DocumentRecord, DocumentState, FunctionStats, MessageRecord, RawBatch,
    SecurityEvent, SecurityEventKind, UserRecord,
};

/// Base security score before penalties
pub const SECURITY_BASE_SCORE: f64 = 100.0;

/// Metrics and status computed from one batch
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Metric values by name
    pub metrics: BTreeMap<String, f64>,

    /// Derived status
    pub status: Status,
}

/// Threshold configuration for every domain
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRules {
    /// Applied to document failure rate (%)
    pub documents: ThresholdLadder,

    /// Applied to message delivery failure rate (%)
    pub messages: ThresholdLadder,

    /// Applied to storage usage (%)
    pub storage: ThresholdLadder,

    /// Applied to locked-account rate (%)
    pub users: ThresholdLadder,

    /// Applied to weighted edge-function error rate (%)
    pub edge_functions: ThresholdLadder,

    /// Penalty tiers on failed login attempts
    pub failed_attempt_penalty: TieredPenalty,

    /// Penalty tiers on policy violations
    pub policy_violation_penalty: TieredPenalty,

    /// Security score ladder
    pub security: PenaltyScore,

    /// Window for "recent" activity metrics
    pub activity_window: chrono::Duration,
}

impl Default for DomainRules {
    fn default() -> Self {
        Self {
            documents: ThresholdLadder::service(10.0, 5.0),
            messages: ThresholdLadder::service(10.0, 5.0),
            storage: ThresholdLadder::service(95.0, 80.0),
            users: ThresholdLadder::service(10.0, 5.0),
            edge_functions: ThresholdLadder::service(10.0, 5.0),
            failed_attempt_penalty: TieredPenalty::new(&[(50.0, 30.0), (20.0, 15.0), (10.0, 5.0)]),
            policy_violation_penalty: TieredPenalty::new(&[(0.0, 20.0)]),
            security: PenaltyScore::new(
                SECURITY_BASE_SCORE,
                ThresholdLadder::falling(
                    &[(50.0, Status::Critical), (75.0, Status::Warning)],
                    Status::Secure,
                ),
            ),
            activity_window: chrono::Duration::hours(24),
        }
    }
}

impl DomainRules {
    /// Evaluate a batch at `now`
    pub fn evaluate(&self, batch: &RawBatch, now: DateTime<Utc>) -> Evaluation {
        match batch {
            RawBatch::Documents(records) => self.documents(records),
            RawBatch::Messages(records) => self.messages(records),
            RawBatch::Storage(buckets) => self.storage(buckets),
            RawBatch::Users(records) => self.users(records, now),
            RawBatch::Security(events) => self.security(events),
            RawBatch::EdgeFunctions(stats) => self.edge_functions(stats),
        }
    }

    /// Status ladder applied to a domain's headline metric (not security)
    pub fn ladder(&self, domain: Domain) -> Option<&ThresholdLadder> {
        match domain {
            Domain::Documents => Some(&self.documents),
            Domain::Messages => Some(&self.messages),
            Domain::Storage => Some(&self.storage),
            Domain::Users => Some(&self.users),
            Domain::EdgeFunctions => Some(&self.edge_functions),
            Domain::Security => None,
        }
    }

    fn documents(&self, records: &[DocumentRecord]) -> Evaluation {
        let total = records.len() as u64;
        let pending = records.iter().filter(|r| r.state == DocumentState::Pending).count() as u64;
        let failed = records.iter().filter(|r| r.state == DocumentState::Failed).count() as u64;
        let failure_rate = percent(failed, total);

        Evaluation {
            metrics: metrics(&[
                ("total", total as f64),
                ("pending", pending as f64),
                ("failed", failed as f64),
                ("failure_rate", failure_rate),
            ]),
            status: self.documents.classify(failure_rate),
        }
    }

    fn messages(&self, records: &[MessageRecord]) -> Evaluation {
        let total = records.len() as u64;
        let undelivered = records.iter().filter(|r| !r.delivered).count() as u64;
        let failure_rate = percent(undelivered, total);

        Evaluation {
            metrics: metrics(&[
                ("total", total as f64),
                ("undelivered", undelivered as f64),
                ("delivery_failure_rate", failure_rate),
            ]),
            status: self.messages.classify(failure_rate),
        }
    }

    fn storage(&self, buckets: &[BucketUsage]) -> Evaluation {
        let used: u64 = buckets.iter().map(|b| b.used_bytes).sum();
        let quota: u64 = buckets.iter().map(|b| b.quota_bytes).sum();
        let objects: u64 = buckets.iter().map(|b| b.object_count).sum();
        let usage = percent(used, quota);

        Evaluation {
            metrics: metrics(&[
                ("used_bytes", used as f64),
                ("quota_bytes", quota as f64),
                ("object_count", objects as f64),
                ("usage_percent", usage),
            ]),
            status: self.storage.classify(usage),
        }
    }

    fn users(&self, records: &[UserRecord], now: DateTime<Utc>) -> Evaluation {
        let cutoff = now - self.activity_window;
        let total = records.len() as u64;
        let active = records
            .iter()
            .filter(|r| r.last_active_at.is_some_and(|at| at >= cutoff))
            .count() as u64;
        let new = records.iter().filter(|r| r.created_at >= cutoff).count() as u64;
        let locked = records.iter().filter(|r| r.locked).count() as u64;
        let locked_rate = percent(locked, total);

        Evaluation {
            metrics: metrics(&[
                ("total", total as f64),
                ("active_24h", active as f64),
                ("new_24h", new as f64),
                ("locked", locked as f64),
                ("locked_rate", locked_rate),
            ]),
            status: self.users.classify(locked_rate),
        }
    }

    fn security(&self, events: &[SecurityEvent]) -> Evaluation {
        let count = |kind: SecurityEventKind| events.iter().filter(|e| e.kind == kind).count() as u64;
        let failed = count(SecurityEventKind::FailedLogin);
        let violations = count(SecurityEventKind::PolicyViolation);
        let suspicious = count(SecurityEventKind::SuspiciousActivity);

        self.security_from_counts(failed, violations, suspicious)
    }

    /// Security evaluation from pre-aggregated counts
    pub fn security_from_counts(&self, failed: u64, violations: u64, suspicious: u64) -> Evaluation {
        let score = self.security.score(&[
            (failed as f64, &self.failed_attempt_penalty),
            (violations as f64, &self.policy_violation_penalty),
        ]);

        Evaluation {
            metrics: metrics(&[
                ("failed_attempts", failed as f64),
                ("policy_violations", violations as f64),
                ("suspicious_events", suspicious as f64),
                ("score", score),
            ]),
            status: self.security.classify(score),
        }
    }

    fn edge_functions(&self, stats: &[FunctionStats]) -> Evaluation {
        let invocations: u64 = stats.iter().map(|s| s.invocations).sum();
        let error_rate = weighted_error_rate(
            &stats
                .iter()
                .map(|s| (s.error_rate, s.invocations))
                .collect::<Vec<_>>(),
        );
        let avg_duration = weighted_mean(
            &stats
                .iter()
                .map(|s| (s.avg_duration_ms, s.invocations))
                .collect::<Vec<_>>(),
        );

        Evaluation {
            metrics: metrics(&[
                ("invocations", invocations as f64),
                ("function_count", stats.len() as f64),
                ("error_rate", error_rate),
                ("avg_duration_ms", avg_duration),
            ]),
            status: self.edge_functions.classify(error_rate),
        }
    }
}

fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}
