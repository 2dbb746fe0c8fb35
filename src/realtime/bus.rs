//! In-Memory Change Bus
//!
//! A process-local [`ChangeSource`]. Each subscription is registered and
//! removed as a single entry, so a subscriber is either wired to all of its
//! topics or to none of them.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use super::source::{ChangeSource, NotificationSink, SubscriptionHandle};
use super::topic::{ChangeNotification, Topic};

struct Subscription {
    topics: BTreeSet<Topic>,
    sink: NotificationSink,
}

/// Topic fan-out held in memory
#[derive(Default)]
pub struct InMemoryChangeBus {
    subscriptions: RwLock<HashMap<SubscriptionHandle, Subscription>>,
    next_id: AtomicU64,
}

impl InMemoryChangeBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish one change on `topic`
    ///
    /// Returns the number of subscriptions that accepted the notification.
    pub fn publish(&self, topic: impl Into<Topic>) -> usize {
        let topic = topic.into();
        let subscriptions = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        subscriptions
            .values()
            .filter(|sub| sub.topics.contains(&topic))
            .filter(|sub| sub.sink.deliver(ChangeNotification::new(topic.clone())))
            .count()
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Topics with at least one subscriber
    pub fn subscribed_topics(&self) -> BTreeSet<Topic> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flat_map(|sub| sub.topics.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl ChangeSource for InMemoryChangeBus {
    async fn subscribe(&self, topics: &BTreeSet<Topic>, sink: NotificationSink) -> Result<SubscriptionHandle> {
        if topics.is_empty() {
            bail!("subscription requires at least one topic");
        }

        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                handle,
                Subscription {
                    topics: topics.clone(),
                    sink,
                },
            );

        debug!(%handle, topics = topics.len(), "Subscription registered");
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        let removed = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);

        match removed {
            Some(_) => {
                debug!(%handle, "Subscription removed");
                Ok(())
            }
            None => bail!("unknown subscription {}", handle),
        }
    }
}
