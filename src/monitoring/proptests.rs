//! Property-Based Tests for Metric Classification
//!
//! - **Weighted rate bounds**: the weighted error rate lies between the
//!   smallest and largest contributing rate, and is 0 with no volume
//! - **Ladder monotonicity**: a higher input never classifies as less severe
//!   on a rising ladder, nor a higher score as more severe on a falling one
//! - **Security score range**: the score never leaves `[50, 100]`, so the
//!   built-in penalties alone never reach critical

use proptest::prelude::*;

use super::bands::{weighted_error_rate, ThresholdLadder};
use super::domain::Status;
use super::rules::DomainRules;

proptest! {
    #[test]
    fn prop_weighted_rate_within_bounds(
        samples in prop::collection::vec((0.0f64..100.0, 0u64..10_000), 0..20),
    ) {
        let rate = weighted_error_rate(&samples);
        let weighted: Vec<f64> = samples
            .iter()
            .filter(|(_, volume)| *volume > 0)
            .map(|(r, _)| *r)
            .collect();

        if weighted.is_empty() {
            prop_assert_eq!(rate, 0.0);
        } else {
            let min = weighted.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = weighted.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(rate >= min - 1e-9);
            prop_assert!(rate <= max + 1e-9);
        }
    }

    #[test]
    fn prop_rising_ladder_monotone(a in 0.0f64..100.0, b in 0.0f64..100.0) {
        let ladder = ThresholdLadder::service(10.0, 5.0);
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(ladder.classify(low).severity() <= ladder.classify(high).severity());
    }

    #[test]
    fn prop_falling_ladder_monotone(a in 0.0f64..100.0, b in 0.0f64..100.0) {
        let ladder = ThresholdLadder::falling(
            &[(50.0, Status::Critical), (75.0, Status::Warning)],
            Status::Secure,
        );
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(ladder.classify(low).severity() >= ladder.classify(high).severity());
    }

    #[test]
    fn prop_security_score_in_range(
        failed in 0u64..500,
        violations in 0u64..50,
        suspicious in 0u64..50,
    ) {
        let rules = DomainRules::default();
        let eval = rules.security_from_counts(failed, violations, suspicious);
        let score = eval.metrics["score"];
        prop_assert!((50.0..=100.0).contains(&score));
        prop_assert_ne!(eval.status, Status::Critical);
    }
}
