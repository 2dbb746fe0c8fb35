//! Read-only view of the latest snapshots
//!
//! Presentation code holds a [`SnapshotBoard`] and reads from it without ever
//! waiting on a refresh.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::monitoring::{Domain, MetricSnapshot, Status};

type SnapshotReceiver = watch::Receiver<Option<Arc<MetricSnapshot>>>;

/// Cloneable handle onto every domain's latest snapshot
#[derive(Debug, Clone)]
pub struct SnapshotBoard {
    receivers: BTreeMap<Domain, SnapshotReceiver>,
}

/// One domain as presented
#[derive(Debug, Clone, Serialize)]
pub struct BoardEntry {
    /// Domain
    pub domain: Domain,

    /// Latest snapshot, absent until the first successful refresh
    pub snapshot: Option<Arc<MetricSnapshot>>,

    /// Freshness marker
    pub last_updated: Option<String>,
}

/// Whole-board presentation payload
#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    /// Worst status across domains with a snapshot
    pub overall: Status,

    /// Per-domain entries in display order
    pub domains: Vec<BoardEntry>,
}

impl SnapshotBoard {
    /// Board over the given per-domain receivers
    pub fn new(receivers: BTreeMap<Domain, SnapshotReceiver>) -> Self {
        Self { receivers }
    }

    /// Latest completed snapshot for `domain`
    pub fn get(&self, domain: Domain) -> Option<Arc<MetricSnapshot>> {
        self.receivers
            .get(&domain)
            .and_then(|rx| rx.borrow().clone())
    }

    /// Every available snapshot in display order
    pub fn all(&self) -> Vec<Arc<MetricSnapshot>> {
        Domain::ALL.iter().filter_map(|d| self.get(*d)).collect()
    }

    /// Domains currently showing stale values
    pub fn stale(&self) -> Vec<Domain> {
        self.all()
            .iter()
            .filter(|s| s.stale)
            .map(|s| s.domain)
            .collect()
    }

    /// Worst status on the board, as a service status
    pub fn overall_status(&self) -> Status {
        let worst = self
            .all()
            .iter()
            .map(|s| s.status.severity())
            .max()
            .unwrap_or(0);
        match worst {
            0 => Status::Healthy,
            1 => Status::Degraded,
            _ => Status::Down,
        }
    }

    /// Wait until `domain`'s snapshot next changes
    ///
    /// Returns `None` once the producing aggregator is gone.
    pub async fn changed(&self, domain: Domain) -> Option<Arc<MetricSnapshot>> {
        let mut rx = self.receivers.get(&domain)?.clone();
        rx.changed().await.ok()?;
        let snapshot = rx.borrow_and_update().clone();
        snapshot
    }

    /// Presentation payload at `now`
    pub fn view(&self, now: DateTime<Utc>) -> BoardView {
        let domains = Domain::ALL
            .into_iter()
            .map(|domain| {
                let snapshot = self.get(domain);
                let last_updated = snapshot.as_ref().map(|s| s.last_updated_label(now));
                BoardEntry {
                    domain,
                    snapshot,
                    last_updated,
                }
            })
            .collect();

        BoardView {
            overall: self.overall_status(),
            domains,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(domain: Domain, status: Status, stale: bool) -> Option<Arc<MetricSnapshot>> {
        Some(Arc::new(MetricSnapshot {
            domain,
            metrics: BTreeMap::new(),
            status,
            computed_at: Utc::now(),
            stale,
            sequence: 1,
        }))
    }

    #[test]
    fn test_board_reads_latest() {
        let (storage_tx, storage_rx) = watch::channel(None);
        let (security_tx, security_rx) = watch::channel(None);
        let board = SnapshotBoard::new(BTreeMap::from([
            (Domain::Storage, storage_rx),
            (Domain::Security, security_rx),
        ]));

        assert!(board.all().is_empty());
        assert_eq!(board.overall_status(), Status::Healthy);

        storage_tx.send_replace(snapshot(Domain::Storage, Status::Degraded, false));
        security_tx.send_replace(snapshot(Domain::Security, Status::Secure, true));

        assert_eq!(board.get(Domain::Storage).unwrap().status, Status::Degraded);
        assert_eq!(board.all().len(), 2);
        assert_eq!(board.stale(), vec![Domain::Security]);
        assert_eq!(board.overall_status(), Status::Degraded);
        assert!(board.get(Domain::Users).is_none());
    }

    #[test]
    fn test_overall_uses_worst_severity() {
        let (tx, rx) = watch::channel(snapshot(Domain::Security, Status::Critical, false));
        let board = SnapshotBoard::new(BTreeMap::from([(Domain::Security, rx)]));
        assert_eq!(board.overall_status(), Status::Down);
        drop(tx);
        assert_eq!(board.overall_status(), Status::Down);
    }

    #[test]
    fn test_view_serializes() {
        let (_tx, rx) = watch::channel(snapshot(Domain::Storage, Status::Healthy, true));
        let board = SnapshotBoard::new(BTreeMap::from([(Domain::Storage, rx)]));

        let json = serde_json::to_value(board.view(Utc::now())).unwrap();
        assert_eq!(json["overall"], "healthy");
        assert_eq!(json["domains"].as_array().unwrap().len(), 6);
        assert_eq!(json["domains"][2]["domain"], "storage");
        assert_eq!(json["domains"][2]["last_updated"], "Last updated just now (stale)");
        assert!(json["domains"][0]["snapshot"].is_null());
    }

    #[tokio::test]
    async fn test_changed_waits_for_update() {
        let (tx, rx) = watch::channel(None);
        let board = SnapshotBoard::new(BTreeMap::from([(Domain::Users, rx)]));

        let waiter = tokio::spawn({
            let board = board.clone();
            async move { board.changed(Domain::Users).await }
        });
        tokio::task::yield_now().await;
        tx.send_replace(snapshot(Domain::Users, Status::Healthy, false));

        let seen = waiter.await.unwrap().unwrap();
        assert_eq!(seen.domain, Domain::Users);
        assert!(board.changed(Domain::Messages).await.is_none());
    }
}
