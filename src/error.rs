//! Error Types
//!
//! This module defines the error kinds surfaced by the monitoring core.

use std::time::Duration;

use crate::monitoring::Domain;

/// Error types for monitoring and throttling operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    /// Rate limit exceeded for a key
    #[error("Rate limit exceeded for {key}: try again in {}s", reset_in.as_secs())]
    AdmissionDenied {
        /// Limiter key that was denied
        key: String,
        /// Time remaining until the window resets, rounded up to whole seconds
        reset_in: Duration,
    },

    /// No anti-forgery token is available to attach
    #[error("No anti-forgery token available for this session")]
    TokenMissing,

    /// Candidate token does not match the current token
    #[error("Anti-forgery token mismatch")]
    TokenMismatch,

    /// Change source could not be established
    #[error("Subscription failure: {0}")]
    SubscriptionFailure(String),

    /// Metric data source unavailable or timed out
    #[error("Fetch failure for {domain}: {reason}")]
    FetchFailure {
        /// Domain whose fetch failed
        domain: Domain,
        /// Underlying reason
        reason: String,
    },

    /// Operation attempted from the wrong lifecycle state
    #[error("Invalid state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires
        expected: &'static str,
        /// State the component was in
        actual: &'static str,
    },
}

impl MonitorError {
    /// Whether the condition is recoverable by the user (retry later, re-authenticate)
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            MonitorError::AdmissionDenied { .. }
                | MonitorError::TokenMissing
                | MonitorError::TokenMismatch
        )
    }
}

/// Result alias for monitoring operations
pub type Result<T> = std::result::Result<T, MonitorError>;
