//! Metric Snapshots
//!
//! Immutable, wholesale-replaced views of one domain's computed metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::domain::{Domain, Status};

/// Computed metrics for one domain at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Domain the snapshot describes
    pub domain: Domain,

    /// Metric values by name
    pub metrics: BTreeMap<String, f64>,

    /// Status derived from `metrics`
    pub status: Status,

    /// When the metrics were computed
    pub computed_at: DateTime<Utc>,

    /// Set when the values are older than the latest refresh attempt, or were
    /// computed from partial data
    pub stale: bool,

    /// Refresh sequence number that produced this snapshot
    pub sequence: u64,
}

impl MetricSnapshot {
    /// Metric value by name
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Copy of this snapshot marked stale
    pub fn as_stale(&self) -> Self {
        Self {
            stale: true,
            ..self.clone()
        }
    }

    /// Seconds elapsed since `computed_at`
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.computed_at).num_seconds().max(0)
    }

    /// Human-readable freshness marker for presentation
    pub fn last_updated_label(&self, now: DateTime<Utc>) -> String {
        let age = self.age_secs(now);
        let when = if age < 60 {
            "just now".to_string()
        } else if age < 3600 {
            format!("{} min ago", age / 60)
        } else {
            format!("{} h ago", age / 3600)
        };
        if self.stale {
            format!("Last updated {} (stale)", when)
        } else {
            format!("Last updated {}", when)
        }
    }
}
