//! Realtime Change Module
//!
//! Change notifications from many topics, multiplexed into one refresh
//! signal.
//!
//! - [`ChangeSource`]: the subscription collaborator
//! - [`InMemoryChangeBus`]: process-local source used by the simulation and tests
//! - [`ChangeMultiplexer`]: lifecycle state machine with a coalescing dispatcher

pub mod bus;
pub mod multiplexer;
pub mod source;
pub mod topic;

pub use bus::InMemoryChangeBus;
pub use multiplexer::{ChangeMultiplexer, CoalescePolicy, MultiplexerState};
pub use source::{ChangeSource, NotificationSink, SubscriptionHandle};
pub use topic::{topic_set, ChangeBatch, ChangeNotification, Topic};
