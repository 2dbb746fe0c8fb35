//! Topics and change notifications

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tokio::time::Instant;

/// A named source of change notifications
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Create a topic from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Topic name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Build a topic set from names
pub fn topic_set<I, S>(names: I) -> BTreeSet<Topic>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Topic::new).collect()
}

/// One "something changed" signal
///
/// The payload of the underlying event is never inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Topic the event arrived on
    pub topic: Topic,

    /// When the source delivered it
    pub received_at: Instant,
}

impl ChangeNotification {
    /// Notification on `topic` received now
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            received_at: Instant::now(),
        }
    }
}

/// Notifications folded into one downstream callback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Distinct topics that changed
    pub topics: BTreeSet<Topic>,

    /// Raw notifications folded in
    pub notifications: usize,
}

impl ChangeBatch {
    /// Batch holding a single notification
    pub fn single(notification: ChangeNotification) -> Self {
        let mut batch = Self::default();
        batch.push(notification);
        batch
    }

    /// Fold another notification in
    pub fn push(&mut self, notification: ChangeNotification) {
        self.topics.insert(notification.topic);
        self.notifications += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_folds_topics() {
        let mut batch = ChangeBatch::single(ChangeNotification::new("documents".into()));
        batch.push(ChangeNotification::new("documents".into()));
        batch.push(ChangeNotification::new("profiles".into()));

        assert_eq!(batch.notifications, 3);
        assert_eq!(batch.topics, topic_set(["documents", "profiles"]));
    }

    #[test]
    fn test_topic_serializes_as_name() {
        let json = serde_json::to_string(&Topic::new("audit_logs")).unwrap();
        assert_eq!(json, "\"audit_logs\"");
    }
}
