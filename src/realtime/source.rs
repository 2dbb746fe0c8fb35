//! Change Source Abstraction
//!
//! The change-notification collaborator accepts one subscription covering a
//! set of topics and pushes a [`ChangeNotification`] into the supplied
//! [`NotificationSink`] per matching event.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::topic::{ChangeNotification, Topic};

/// Identifies one established subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Delivery end handed to a change source
///
/// Once closed, every delivery is refused, including deliveries from clones
/// still held by the source.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<ChangeNotification>,
    open: Arc<AtomicBool>,
}

impl NotificationSink {
    /// Create a sink and the receiver it feeds
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChangeNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                open: Arc::new(AtomicBool::new(true)),
            },
            rx,
        )
    }

    /// Deliver a notification; false if the sink is closed
    pub fn deliver(&self, notification: ChangeNotification) -> bool {
        self.is_open() && self.tx.send(notification).is_ok()
    }

    /// Refuse all further deliveries
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Whether deliveries are still accepted
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

/// Change-notification collaborator
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Establish one subscription covering every topic in `topics`
    async fn subscribe(&self, topics: &BTreeSet<Topic>, sink: NotificationSink) -> Result<SubscriptionHandle>;

    /// Release a subscription
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}
