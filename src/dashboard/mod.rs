//! Dashboard Module
//!
//! The [`DashboardOrchestrator`] wires change notifications and the refresh
//! cadence to one aggregator per monitored domain, and hands presentation
//! code a [`SnapshotBoard`].

pub mod board;
pub mod orchestrator;

pub use board::{BoardEntry, BoardView, SnapshotBoard};
pub use orchestrator::{DashboardOrchestrator, OrchestratorSettings};
