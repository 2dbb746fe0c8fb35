//! Fixed-Window Counter
//!
//! This module provides the per-key window state and the admission decision
//! returned to callers.
//!
//! The counter resets wholesale when its window expires. A burst straddling a
//! window boundary can therefore admit up to `2 * max_requests - 1` requests in
//! a span shorter than one window. This is a known limitation of the advisory
//! throttle, accepted in exchange for O(1) memory per key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::scheduler::deadline_after;

/// Key identifying one actor performing one action on one resource
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct LimitKey(String);

impl LimitKey {
    /// Build a key rendered as `"{action}:{actor}:{resource}"`
    pub fn new(action: &str, actor: &str, resource: &str) -> Self {
        Self(format!("{}:{}:{}", action, actor, resource))
    }

    /// Wrap an already-rendered key
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Action segment (text before the first ':')
    pub fn action(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counter state for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Requests admitted in the current window
    pub count: u32,

    /// Instant at which the current window ends
    pub window_reset_at: Instant,
}

impl WindowState {
    /// Open a fresh window with one admitted request
    pub fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_reset_at: deadline_after(now, window),
        }
    }

    /// Whether the window has ended at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.window_reset_at
    }

    /// Time left until the window ends
    pub fn remaining(&self, now: Instant) -> Duration {
        self.window_reset_at.saturating_duration_since(now)
    }

    /// Apply one admission attempt
    ///
    /// `count` is only incremented inside the window; an expired window is
    /// reopened with `count = 1`.
    pub fn admit(&mut self, now: Instant, max_requests: u32, window: Duration) -> Decision {
        if self.is_expired(now) {
            *self = Self::open(now, window);
            return Decision::allowed(self.count);
        }

        if self.count < max_requests {
            self.count += 1;
            Decision::allowed(self.count)
        } else {
            Decision::denied(self.count, round_up_secs(self.remaining(now)))
        }
    }
}

/// Round a duration up to whole seconds
pub fn round_up_secs(duration: Duration) -> Duration {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        Duration::from_secs(secs + 1)
    } else {
        Duration::from_secs(secs)
    }
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the request is allowed
    pub allowed: bool,

    /// Requests counted in the current window (including this one when allowed)
    pub count: u32,

    /// Time until the window resets (only when denied), whole seconds
    pub reset_in: Option<Duration>,
}

impl Decision {
    /// Create an allowed decision
    pub fn allowed(count: u32) -> Self {
        Self {
            allowed: true,
            count,
            reset_in: None,
        }
    }

    /// Create a denied decision
    pub fn denied(count: u32, reset_in: Duration) -> Self {
        Self {
            allowed: false,
            count,
            reset_in: Some(reset_in),
        }
    }

    /// Decision used when limiting is disabled
    pub fn unlimited() -> Self {
        Self::allowed(0)
    }

    /// User-facing wait message for a denied decision
    pub fn wait_message(&self) -> Option<String> {
        self.reset_in.map(|reset_in| {
            let secs = reset_in.as_secs();
            if secs >= 120 {
                format!(
                    "Too many attempts. Please try again in {} minutes.",
                    secs.div_ceil(60)
                )
            } else {
                format!("Too many attempts. Please try again in {} seconds.", secs)
            }
        })
    }
}
