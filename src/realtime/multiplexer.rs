//! Change Multiplexer
//!
//! Subscribes to many topics through one underlying subscription and turns
//! the notifications into calls of a single "something changed" callback.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──start()──► Subscribing ──ok──► Active ──stop()──► TearingDown ──► Closed
//!       ▲                         │
//!       └────────── error ────────┘
//! ```
//!
//! Callbacks run only on the dispatcher task. `stop()` closes the delivery
//! gate, releases the subscription and joins the dispatcher before returning,
//! so no callback can run once it has returned.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::source::{ChangeSource, NotificationSink, SubscriptionHandle};
use super::topic::{ChangeBatch, ChangeNotification, Topic};
use crate::error::{MonitorError, Result};
use crate::metrics;
use crate::scheduler::deadline_after;

/// Default coalescing window
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(250);

/// Default bound on establishing the subscription
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback invoked per delivered batch
pub type ChangeCallback = Arc<dyn Fn(ChangeBatch) + Send + Sync>;

/// How notifications map to callback invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoalescePolicy {
    /// One callback per notification
    PerEvent,
    /// The first notification opens a window; everything arriving before it
    /// closes is folded into one callback
    Window(Duration),
}

impl Default for CoalescePolicy {
    fn default() -> Self {
        CoalescePolicy::Window(DEFAULT_COALESCE_WINDOW)
    }
}

impl CoalescePolicy {
    /// `PerEvent` for zero, otherwise a window of `ms` milliseconds
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            CoalescePolicy::PerEvent
        } else {
            CoalescePolicy::Window(Duration::from_millis(ms))
        }
    }
}

/// Lifecycle state of a multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexerState {
    Uninitialized,
    Subscribing,
    Active,
    TearingDown,
    Closed,
}

impl MultiplexerState {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            MultiplexerState::Uninitialized => "uninitialized",
            MultiplexerState::Subscribing => "subscribing",
            MultiplexerState::Active => "active",
            MultiplexerState::TearingDown => "tearing_down",
            MultiplexerState::Closed => "closed",
        }
    }
}

impl fmt::Display for MultiplexerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything owned while active
struct LiveSubscription {
    handle: SubscriptionHandle,
    sink: NotificationSink,
    shutdown: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
}

/// Fans many topics into one refresh signal
pub struct ChangeMultiplexer {
    source: Arc<dyn ChangeSource>,
    policy: CoalescePolicy,
    subscribe_timeout: Duration,
    state: std::sync::Mutex<MultiplexerState>,
    /// Held across start and stop so they never interleave
    live: Mutex<Option<LiveSubscription>>,
}

impl ChangeMultiplexer {
    /// Create an uninitialized multiplexer
    pub fn new(source: Arc<dyn ChangeSource>, policy: CoalescePolicy) -> Self {
        Self {
            source,
            policy,
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
            state: std::sync::Mutex::new(MultiplexerState::Uninitialized),
            live: Mutex::new(None),
        }
    }

    /// Override the subscribe timeout
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> MultiplexerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Coalescing policy in effect
    pub fn policy(&self) -> CoalescePolicy {
        self.policy
    }

    fn set_state(&self, next: MultiplexerState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(from = %*state, to = %next, "Multiplexer transition");
        *state = next;
    }

    /// Subscribe to `topics` and start delivering to `on_change`
    ///
    /// On failure the multiplexer stays `Uninitialized` and may be started
    /// again.
    pub async fn start<F>(&self, topics: BTreeSet<Topic>, on_change: F) -> Result<()>
    where
        F: Fn(ChangeBatch) + Send + Sync + 'static,
    {
        let mut live = self.live.lock().await;

        let current = self.state();
        if current != MultiplexerState::Uninitialized {
            return Err(MonitorError::InvalidState {
                expected: MultiplexerState::Uninitialized.as_str(),
                actual: current.as_str(),
            });
        }
        self.set_state(MultiplexerState::Subscribing);

        let (sink, rx) = NotificationSink::channel();
        let subscribed = time::timeout(
            self.subscribe_timeout,
            self.source.subscribe(&topics, sink.clone()),
        )
        .await;

        let handle = match subscribed {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                sink.close();
                self.set_state(MultiplexerState::Uninitialized);
                warn!(error = %e, "Change subscription failed");
                return Err(MonitorError::SubscriptionFailure(format!("{:#}", e)));
            }
            Err(_) => {
                sink.close();
                self.set_state(MultiplexerState::Uninitialized);
                warn!(timeout = ?self.subscribe_timeout, "Change subscription timed out");
                return Err(MonitorError::SubscriptionFailure(format!(
                    "subscribe timed out after {:?}",
                    self.subscribe_timeout
                )));
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(dispatch(
            rx,
            shutdown_rx,
            sink.clone(),
            self.policy,
            Arc::new(on_change),
        ));

        *live = Some(LiveSubscription {
            handle,
            sink,
            shutdown,
            dispatcher,
        });
        self.set_state(MultiplexerState::Active);

        info!(%handle, topics = ?topics, policy = ?self.policy, "Change multiplexer active");
        Ok(())
    }

    /// Release the subscription and stop all callbacks
    ///
    /// Idempotent once closed. Stopping a multiplexer that never started
    /// closes it directly.
    pub async fn stop(&self) -> Result<()> {
        let mut live = self.live.lock().await;

        match self.state() {
            MultiplexerState::Closed => return Ok(()),
            MultiplexerState::Uninitialized => {
                self.set_state(MultiplexerState::Closed);
                return Ok(());
            }
            MultiplexerState::Active => {}
            other => {
                return Err(MonitorError::InvalidState {
                    expected: MultiplexerState::Active.as_str(),
                    actual: other.as_str(),
                })
            }
        }

        self.set_state(MultiplexerState::TearingDown);

        if let Some(sub) = live.take() {
            sub.sink.close();

            if let Err(e) = self.source.unsubscribe(sub.handle).await {
                warn!(handle = %sub.handle, error = %e, "Unsubscribe failed during teardown");
            }

            let _ = sub.shutdown.send(true);
            if let Err(e) = sub.dispatcher.await {
                warn!(error = %e, "Dispatcher ended abnormally");
            }
        }

        self.set_state(MultiplexerState::Closed);
        info!("Change multiplexer closed");
        Ok(())
    }
}

impl Drop for ChangeMultiplexer {
    fn drop(&mut self) {
        if let Some(sub) = self.live.get_mut().take() {
            sub.sink.close();
            let _ = sub.shutdown.send(true);
            sub.dispatcher.abort();
            debug!(handle = %sub.handle, "Multiplexer dropped while active");
        }
    }
}

impl fmt::Debug for ChangeMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeMultiplexer")
            .field("state", &self.state())
            .field("policy", &self.policy)
            .field("subscribe_timeout", &self.subscribe_timeout)
            .finish()
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<ChangeNotification>,
    mut shutdown: watch::Receiver<bool>,
    gate: NotificationSink,
    policy: CoalescePolicy,
    on_change: ChangeCallback,
) {
    loop {
        let first = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = rx.recv() => match next {
                Some(notification) => notification,
                None => break,
            },
        };
        metrics::CHANGE_NOTIFICATIONS_TOTAL.inc();
        let mut batch = ChangeBatch::single(first);

        if let CoalescePolicy::Window(window) = policy {
            let deadline = deadline_after(Instant::now(), window);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return,
                    _ = time::sleep_until(deadline) => break,
                    next = rx.recv() => match next {
                        Some(notification) => {
                            metrics::CHANGE_NOTIFICATIONS_TOTAL.inc();
                            batch.push(notification);
                        }
                        None => break,
                    },
                }
            }
        }

        if !gate.is_open() {
            break;
        }

        metrics::CHANGE_BATCHES_TOTAL.inc();
        debug!(notifications = batch.notifications, topics = batch.topics.len(), "Dispatching change batch");
        on_change(batch);
    }
}
