//! opswatch Library
//!
//! Real-time monitoring and throttling core for an operations dashboard:
//! per-actor admission control, session anti-forgery tokens, per-domain
//! metric aggregation, and change-notification multiplexing.

pub mod config;
pub mod csrf;
pub mod dashboard;
pub mod error;
pub mod metrics;
pub mod metrics_server;
pub mod monitoring;
pub mod rate_limit;
pub mod realtime;
pub mod scheduler;
pub mod simulation;

pub use error::{MonitorError, Result};
