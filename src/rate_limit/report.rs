//! Admin Reporting
//!
//! Serializable usage summaries of the limiter registry for admin views.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::time::Instant;

use super::store::LimiterRegistry;

/// Usage report for admin interfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterReport {
    /// Timestamp of report generation
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Number of keys currently tracked
    pub tracked_keys: usize,

    /// Requests admitted since the registry was created
    pub admitted_total: u64,

    /// Requests denied since the registry was created
    pub denied_total: u64,

    /// Tracked keys grouped by action
    pub keys_by_action: BTreeMap<String, usize>,

    /// Per-key details, most used first
    pub entries: Vec<ReportEntry>,
}

/// One tracked key in a report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportEntry {
    /// Limiter key
    pub key: String,

    /// Requests counted in the current window
    pub count: u32,

    /// Whole seconds until the window resets
    pub reset_in_secs: u64,
}

impl LimiterReport {
    /// Build a report from a registry snapshot taken at `now`
    pub fn from_registry(registry: &LimiterRegistry, now: Instant) -> Self {
        let views = registry.views(now);

        let mut keys_by_action: BTreeMap<String, usize> = BTreeMap::new();
        for view in &views {
            *keys_by_action.entry(view.key.action().to_string()).or_default() += 1;
        }

        let mut entries: Vec<ReportEntry> = views
            .into_iter()
            .map(|view| ReportEntry {
                key: view.key.to_string(),
                count: view.count,
                reset_in_secs: super::window::round_up_secs(view.reset_in).as_secs(),
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));

        Self {
            timestamp: chrono::Utc::now(),
            tracked_keys: entries.len(),
            admitted_total: registry.admitted_total(),
            denied_total: registry.denied_total(),
            keys_by_action,
            entries,
        }
    }

    /// Share of checks that were denied, in percent
    pub fn denial_rate_percent(&self) -> f64 {
        let total = self.admitted_total + self.denied_total;
        if total == 0 {
            0.0
        } else {
            self.denied_total as f64 / total as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::window::LimitKey;
    use std::time::Duration;

    #[test]
    fn test_report_groups_by_action() {
        let registry = LimiterRegistry::new();
        let now = Instant::now();
        let window = Duration::from_secs(60);

        registry.check(&LimitKey::new("invite", "u1", "p1"), 5, window, now);
        registry.check(&LimitKey::new("invite", "u1", "p1"), 5, window, now);
        registry.check(&LimitKey::new("invite", "u2", "p1"), 5, window, now);
        registry.check(&LimitKey::new("form_submit", "u1", "contact"), 5, window, now);

        let report = LimiterReport::from_registry(&registry, now);

        assert_eq!(report.tracked_keys, 3);
        assert_eq!(report.admitted_total, 4);
        assert_eq!(report.keys_by_action.get("invite"), Some(&2));
        assert_eq!(report.keys_by_action.get("form_submit"), Some(&1));
        assert_eq!(report.entries[0].key, "invite:u1:p1");
        assert_eq!(report.entries[0].count, 2);
        assert_eq!(report.entries[0].reset_in_secs, 60);
    }

    #[test]
    fn test_denial_rate() {
        let registry = LimiterRegistry::new();
        let now = Instant::now();
        let key = LimitKey::raw("k");
        registry.check(&key, 1, Duration::from_secs(60), now);
        registry.check(&key, 1, Duration::from_secs(60), now);

        let report = LimiterReport::from_registry(&registry, now);
        assert!((report.denial_rate_percent() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_report_serialization() {
        let report = LimiterReport::from_registry(&LimiterRegistry::new(), Instant::now());
        assert_eq!(report.denial_rate_percent(), 0.0);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"tracked_keys\":0"));
    }
}
