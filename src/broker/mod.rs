//! The `broker` module is the core of the relay: topic registry, per-topic
//! broadcast groups, and the engine that fans one message out to a group.

pub mod group;
pub mod message;
pub mod registry;
pub mod relay;

pub use group::{BroadcastGroup, RelayPolicy};
pub use message::Message;
pub use registry::{RetentionPolicy, TopicRegistry};
pub use relay::{Dispatcher, RelayReport};
