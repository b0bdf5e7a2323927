//! Message relay between the chat gateway's queues and the order runtime.
//!
//! Inbound order messages are taken one at a time, answered (with a
//! fallback acknowledgement first when processing is slow), optionally
//! copied to broadcast groups, and only then acknowledged.

pub mod envelope;
pub mod groups;
pub mod runner;
pub mod transport;

pub use envelope::{Delivery, InboundEnvelope, OutboundMessage};
pub use groups::{GroupDirectory, StaticGroupDirectory};
pub use runner::{should_broadcast, MessageHandler, RelayRunner, RelaySettings};
pub use transport::{
    channel_transport, ChannelQueueTransport, InMemoryQueueTransport, NoopQueueTransport,
    QueueTransport, ReconnectPolicy, TransportError,
};
