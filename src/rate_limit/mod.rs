//! Rate Limiting Module
//!
//! This module provides per-actor admission control for write-heavy actions
//! such as invitations and form submissions.
//!
//! # Features
//!
//! - Fixed-window counter per `"{action}:{actor}:{resource}"` key
//! - Configurable per-action policies (default 5 requests per 5 minutes)
//! - Background sweep of expired windows
//! - Admin report of tracked keys and denial totals
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Windowed Rate Limiter                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐         │
//! │  │ Action      │  │ Cleanup     │  │ Admin       │         │
//! │  │ Policies    │  │ Sweep       │  │ Report      │         │
//! │  └─────────────┘  └─────────────┘  └─────────────┘         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │              Limiter Registry (In-Memory)            │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The limiter is advisory. A burst straddling a window boundary can admit
//! up to `2 * max_requests - 1` requests; see [`window`].

pub mod config;
pub mod limiter;
pub mod report;
pub mod store;
pub mod window;

#[cfg(test)]
mod proptests;

pub use config::{ActionPolicy, RateLimitConfig};
pub use limiter::WindowedRateLimiter;
pub use report::LimiterReport;
pub use store::LimiterRegistry;
pub use window::{Decision, LimitKey};
