//! Rate Limit Configuration
//!
//! Configuration for per-actor admission control.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default requests admitted per window
pub const DEFAULT_MAX_REQUESTS: u32 = 5;
/// Default window length (5 minutes)
pub const DEFAULT_WINDOW_SECS: u64 = 300;
/// Default interval between expired-entry sweeps (5 minutes)
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
/// Longest accepted window (7 days)
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 3600;
/// Longest accepted interval between sweeps (1 day)
pub const MAX_CLEANUP_INTERVAL_SECS: u64 = 24 * 3600;

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Requests admitted per window when no action policy matches
    pub default_max_requests: u32,

    /// Window length in seconds when no action policy matches
    pub default_window_secs: u64,

    /// Interval between cleanup sweeps in seconds
    pub cleanup_interval_secs: u64,

    /// Per-action policy overrides, keyed by action name (e.g. "invite")
    pub actions: HashMap<String, ActionPolicyConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_max_requests: DEFAULT_MAX_REQUESTS,
            default_window_secs: DEFAULT_WINDOW_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            actions: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable rate limiting (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Add or replace the policy for an action
    pub fn with_action(mut self, action: &str, max_requests: u32, window_secs: u64) -> Self {
        self.actions.insert(
            action.to_string(),
            ActionPolicyConfig {
                max_requests,
                window_secs,
            },
        );
        self
    }

    /// Policy applied when an action has no override
    pub fn default_policy(&self) -> ActionPolicy {
        ActionPolicy::new(
            self.default_max_requests,
            Duration::from_secs(self.default_window_secs),
        )
    }

    /// Resolve the policy for an action
    pub fn policy_for(&self, action: &str) -> ActionPolicy {
        self.actions
            .get(action)
            .map(|p| ActionPolicy::new(p.max_requests, Duration::from_secs(p.window_secs)))
            .unwrap_or_else(|| self.default_policy())
    }

    /// Get cleanup sweep interval
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Validate limits and intervals
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_max_requests == 0 {
            anyhow::bail!("Rate limit max requests must be > 0");
        }
        if self.default_window_secs == 0 || self.default_window_secs > MAX_WINDOW_SECS {
            anyhow::bail!("Rate limit window must be between 1 and {} seconds", MAX_WINDOW_SECS);
        }
        if self.cleanup_interval_secs == 0 || self.cleanup_interval_secs > MAX_CLEANUP_INTERVAL_SECS {
            anyhow::bail!(
                "Rate limit cleanup interval must be between 1 and {} seconds",
                MAX_CLEANUP_INTERVAL_SECS
            );
        }
        for (action, policy) in &self.actions {
            if action.is_empty() {
                anyhow::bail!("Rate limit action name must not be empty");
            }
            if policy.max_requests == 0 || policy.window_secs == 0 {
                anyhow::bail!(
                    "Rate limit policy for '{}' must have positive max_requests and window_secs",
                    action
                );
            }
            if policy.window_secs > MAX_WINDOW_SECS {
                anyhow::bail!(
                    "Rate limit policy for '{}' has a window longer than {} seconds",
                    action,
                    MAX_WINDOW_SECS
                );
            }
        }
        Ok(())
    }
}

/// Serialized form of a per-action policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionPolicyConfig {
    /// Requests admitted per window
    pub max_requests: u32,

    /// Window length in seconds
    pub window_secs: u64,
}

/// Resolved admission policy for an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPolicy {
    /// Requests admitted per window
    pub max_requests: u32,

    /// Window length
    pub window: Duration,
}

impl ActionPolicy {
    /// Create a policy
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, Duration::from_secs(DEFAULT_WINDOW_SECS))
    }
}
