//! Threshold Band Evaluation
//!
//! One evaluator shared by every domain: a ladder of thresholds checked in
//! order, first match wins, with a fallback status. Rising ladders classify
//! "higher is worse" inputs (error rates, usage); falling ladders classify
//! "lower is worse" inputs (security score).

use serde::{Deserialize, Serialize};

use super::domain::Status;

/// Comparison applied by one band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Threshold {
    /// Matches when `value > edge`
    Above(f64),
    /// Matches when `value < edge`
    Below(f64),
}

impl Threshold {
    fn matches(&self, value: f64) -> bool {
        match *self {
            Threshold::Above(edge) => value > edge,
            Threshold::Below(edge) => value < edge,
        }
    }
}

/// Ordered threshold bands with a fallback label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLadder {
    bands: Vec<(Threshold, Status)>,
    fallback: Status,
}

impl ThresholdLadder {
    /// Ladder for "higher is worse" inputs
    ///
    /// Bands are ordered from the highest edge down, so the most severe
    /// matching band wins regardless of argument order.
    pub fn rising(bands: &[(f64, Status)], fallback: Status) -> Self {
        let mut bands: Vec<(f64, Status)> = bands.to_vec();
        bands.sort_by(|a, b| b.0.total_cmp(&a.0));
        Self {
            bands: bands
                .into_iter()
                .map(|(edge, status)| (Threshold::Above(edge), status))
                .collect(),
            fallback,
        }
    }

    /// Ladder for "lower is worse" inputs
    pub fn falling(bands: &[(f64, Status)], fallback: Status) -> Self {
        let mut bands: Vec<(f64, Status)> = bands.to_vec();
        bands.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            bands: bands
                .into_iter()
                .map(|(edge, status)| (Threshold::Below(edge), status))
                .collect(),
            fallback,
        }
    }

    /// Standard service ladder: `> down_above` is Down, `> degraded_above` is Degraded
    pub fn service(down_above: f64, degraded_above: f64) -> Self {
        Self::rising(
            &[(down_above, Status::Down), (degraded_above, Status::Degraded)],
            Status::Healthy,
        )
    }

    /// Classify a value
    ///
    /// NaN matches no band and yields the fallback.
    pub fn classify(&self, value: f64) -> Status {
        self.bands
            .iter()
            .find(|(threshold, _)| threshold.matches(value))
            .map(|(_, status)| *status)
            .unwrap_or(self.fallback)
    }
}

/// Tiered penalty for one input: the first tier whose edge is exceeded applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredPenalty {
    /// `(edge, penalty)` pairs, highest edge first
    tiers: Vec<(f64, f64)>,
}

impl TieredPenalty {
    /// Build from `(edge, penalty)` pairs in any order
    pub fn new(tiers: &[(f64, f64)]) -> Self {
        let mut tiers = tiers.to_vec();
        tiers.sort_by(|a, b| b.0.total_cmp(&a.0));
        Self { tiers }
    }

    /// Penalty for `value` (0 when no tier is exceeded)
    pub fn penalty(&self, value: f64) -> f64 {
        self.tiers
            .iter()
            .find(|(edge, _)| value > *edge)
            .map(|(_, penalty)| *penalty)
            .unwrap_or(0.0)
    }
}

/// Score that starts at a base and loses penalties, then classified by a ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyScore {
    base: f64,
    ladder: ThresholdLadder,
}

impl PenaltyScore {
    /// Create a scorer
    pub fn new(base: f64, ladder: ThresholdLadder) -> Self {
        Self { base, ladder }
    }

    /// Score after subtracting the penalties for each `(value, tiers)` input
    pub fn score(&self, inputs: &[(f64, &TieredPenalty)]) -> f64 {
        let penalties: f64 = inputs
            .iter()
            .map(|(value, tiers)| tiers.penalty(*value))
            .sum();
        self.base - penalties
    }

    /// Classify a score
    pub fn classify(&self, score: f64) -> Status {
        self.ladder.classify(score)
    }
}

/// Volume-weighted error rate: `Σ(rate_i × volume_i) / Σ(volume_i)`
///
/// Zero total volume yields 0.
pub fn weighted_error_rate(samples: &[(f64, u64)]) -> f64 {
    weighted_mean(samples)
}

/// Volume-weighted mean of `(value, weight)` samples; 0 when total weight is 0
pub fn weighted_mean(samples: &[(f64, u64)]) -> f64 {
    let total: u64 = samples.iter().map(|(_, weight)| *weight).sum();
    if total == 0 {
        return 0.0;
    }
    let weighted: f64 = samples
        .iter()
        .map(|(value, weight)| value * *weight as f64)
        .sum();
    weighted / total as f64
}

/// `part / whole` in percent; 0 when `whole` is 0
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
