//! Live status events.
//!
//! The bus keeps a registry of subscriber sinks and writes every published
//! event to all of them. Events are framed as `event-name + JSON payload`.

pub mod bus;
pub mod sink;
pub mod types;

pub use bus::{EventBus, Subscription, SubscriptionHandle};
pub use sink::{ChannelSink, EventSink, SinkError};
pub use types::{EVENT_SCHEMA_VERSION, EventFrame, ServerEvent};
