//! Monitoring Module
//!
//! Derived health and usage metrics for each monitored domain.
//!
//! Each [`MetricAggregator`] fetches raw records from a [`DataSource`],
//! evaluates them through the shared threshold evaluator in [`bands`], and
//! publishes an immutable [`MetricSnapshot`]. Failed refreshes keep the
//! previous snapshot, marked stale.

pub mod aggregator;
pub mod bands;
pub mod domain;
pub mod rules;
pub mod snapshot;
pub mod source;

#[cfg(test)]
mod proptests;

pub use aggregator::{AggregatorSettings, MetricAggregator};
pub use bands::{weighted_error_rate, PenaltyScore, ThresholdLadder, TieredPenalty};
pub use domain::{Domain, Status};
pub use rules::{DomainRules, Evaluation};
pub use snapshot::MetricSnapshot;
pub use source::{DataSource, FetchWindow, FetchedBatch, RawBatch};
