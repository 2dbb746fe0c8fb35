// Periodic task scheduling
//
// Timer-driven work (cleanup sweeps, refresh cadence) runs on a ticking task
// owned by a `PeriodicTask` handle:
// - First tick fires one full period after spawn
// - Ticks are skipped, not bursted, if the callback overruns
// - `cancel()` waits until the task has exited, so no tick runs after it returns
// - Periods and deadlines are clamped to `MAX_DELAY`
//
// All timing goes through `tokio::time`, so tests drive it with a paused clock.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Longest delay any timer is armed with (one year)
pub const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 3600);

/// Instant `delay` after `now`, with `delay` clamped to [`MAX_DELAY`]
pub fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now + delay.min(MAX_DELAY)
}

/// Handle to a background task invoked on a fixed period
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    period: Duration,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn a task that awaits `tick()` once per `period`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.min(MAX_DELAY);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(deadline_after(Instant::now(), period), period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        debug!(task = name, "Periodic tick");
                        tick().await;
                    }
                }
            }

            debug!(task = name, "Periodic task stopped");
        });

        Self {
            name,
            period,
            shutdown,
            handle,
        }
    }

    /// Task name (for diagnostics)
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for it to exit
    ///
    /// A tick already in progress is allowed to finish; no new tick starts.
    pub async fn cancel(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::warn!(task = self.name, "Periodic task panicked: {}", e);
            }
        }
    }
}
