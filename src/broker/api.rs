//! Public API for the broker capability
//!
//! External modules should import from here rather than directly from the
//! internal modules.

// Capability traits
pub use crate::broker::traits::{
    Connection, ConnectionFactory, ConsumerSpec, MessageConsumer, Session, TransactionManager,
    TransactionStatus,
};

// Messages, destinations and session modes
pub use crate::broker::message::{Destination, DestinationKind, Message, MessageHeader, SessionMode};

// In-process broker
pub use crate::broker::memory::InMemoryBroker;

// Error handling
pub use crate::broker::error::{BrokerError, BrokerResult};
