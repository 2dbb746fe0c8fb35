//! Property-Based Tests for the Windowed Rate Limiter
//!
//! # Test Strategies
//!
//! - **Window bound**: within one window at most `max_requests` calls are admitted
//! - **Reset**: the first call at or after `window_reset_at` is admitted with count 1
//! - **Boundary burst**: two adjacent windows never admit more than `2 * max - 1`
//!   calls inside one window-length span
//! - **Sweep**: an idle registry always sweeps to empty

use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;

use super::store::LimiterRegistry;
use super::window::LimitKey;

proptest! {
    #[test]
    fn prop_at_most_n_admitted_per_window(
        max in 1u32..20,
        window_secs in 1u64..3600,
        offsets in prop::collection::vec(0u64..1000, 1..60),
    ) {
        let registry = LimiterRegistry::new();
        let key = LimitKey::raw("prop");
        let window = Duration::from_secs(window_secs);
        let start = Instant::now();

        // All calls land strictly inside the first window
        let mut offsets: Vec<u64> = offsets
            .into_iter()
            .map(|ms| ms * window.as_millis() as u64 / 1000)
            .collect();
        offsets.sort_unstable();

        let admitted = offsets
            .iter()
            .filter(|ms| registry.check(&key, max, window, start + Duration::from_millis(**ms)).allowed)
            .count();

        prop_assert_eq!(admitted, offsets.len().min(max as usize));
    }

    #[test]
    fn prop_n_plus_one_denied_then_reset(max in 1u32..20, window_secs in 1u64..3600) {
        let registry = LimiterRegistry::new();
        let key = LimitKey::raw("prop");
        let window = Duration::from_secs(window_secs);
        let start = Instant::now();

        for expected in 1..=max {
            let decision = registry.check(&key, max, window, start);
            prop_assert!(decision.allowed);
            prop_assert_eq!(decision.count, expected);
        }

        let denied = registry.check(&key, max, window, start);
        prop_assert!(!denied.allowed);
        prop_assert_eq!(denied.reset_in, Some(window));

        let fresh = registry.check(&key, max, window, start + window);
        prop_assert!(fresh.allowed);
        prop_assert_eq!(fresh.count, 1);
    }

    #[test]
    fn prop_boundary_burst_bounded(max in 1u32..20, window_secs in 2u64..3600) {
        let registry = LimiterRegistry::new();
        let key = LimitKey::raw("prop");
        let window = Duration::from_secs(window_secs);
        let start = Instant::now();

        // Open the window, then burst just before and just after the boundary
        registry.check(&key, max, window, start);
        let before = start + window - Duration::from_millis(1);
        let after = start + window;

        let mut admitted_in_span = 0;
        for _ in 0..max * 2 {
            if registry.check(&key, max, window, before).allowed {
                admitted_in_span += 1;
            }
        }
        for _ in 0..max * 2 {
            if registry.check(&key, max, window, after).allowed {
                admitted_in_span += 1;
            }
        }

        prop_assert!(admitted_in_span <= 2 * max - 1);
    }

    #[test]
    fn prop_idle_registry_sweeps_to_empty(
        keys in prop::collection::hash_set("[a-z]{1,8}", 1..30),
        window_secs in 1u64..3600,
    ) {
        let registry = LimiterRegistry::new();
        let window = Duration::from_secs(window_secs);
        let start = Instant::now();

        for key in &keys {
            registry.check(&LimitKey::raw(key.clone()), 5, window, start);
        }
        prop_assert_eq!(registry.len(), keys.len());

        registry.sweep_expired(start + window + Duration::from_secs(1));
        prop_assert!(registry.is_empty());
    }
}
