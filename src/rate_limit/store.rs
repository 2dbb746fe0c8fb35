//! Limiter Registry
//!
//! In-memory storage for window counters. Entries are only reachable through
//! the registry's own methods; nothing hands out references to live state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::window::{Decision, LimitKey, WindowState};

/// Copy of one registry entry, for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    /// Limiter key
    pub key: LimitKey,

    /// Requests counted in the current window
    pub count: u32,

    /// Time until the window resets
    pub reset_in: Duration,
}

/// Shared registry of window counters
#[derive(Debug, Clone, Default)]
pub struct LimiterRegistry {
    /// Counter state by key
    entries: Arc<Mutex<HashMap<LimitKey, WindowState>>>,

    /// Requests admitted since creation
    admitted: Arc<AtomicU64>,

    /// Requests denied since creation
    denied: Arc<AtomicU64>,
}

impl LimiterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<LimitKey, WindowState>> {
        // Every mutation completes within one statement, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one admission attempt for `key` at `now`
    pub fn check(
        &self,
        key: &LimitKey,
        max_requests: u32,
        window: Duration,
        now: Instant,
    ) -> Decision {
        let decision = {
            let mut entries = self.lock();
            match entries.get_mut(key) {
                Some(state) => state.admit(now, max_requests, window),
                None => {
                    let state = WindowState::open(now, window);
                    entries.insert(key.clone(), state);
                    Decision::allowed(state.count)
                }
            }
        };

        if decision.allowed {
            self.admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }

        decision
    }

    /// Remove every entry whose window has expired at `now`
    ///
    /// Same expiry test as admission. Returns the number of entries removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, state| !state.is_expired(now));
        before - entries.len()
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the entry for `key`, if tracked
    pub fn view(&self, key: &LimitKey, now: Instant) -> Option<EntryView> {
        self.lock().get(key).map(|state| EntryView {
            key: key.clone(),
            count: state.count,
            reset_in: state.remaining(now),
        })
    }

    /// Copies of all entries
    pub fn views(&self, now: Instant) -> Vec<EntryView> {
        self.lock()
            .iter()
            .map(|(key, state)| EntryView {
                key: key.clone(),
                count: state.count,
                reset_in: state.remaining(now),
            })
            .collect()
    }

    /// Requests admitted since creation
    pub fn admitted_total(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    /// Requests denied since creation
    pub fn denied_total(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.lock().clear();
    }
}
