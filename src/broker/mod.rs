//! Broker capability
//!
//! The container consumes a broker through a small set of traits modelled on
//! the classic connection / session / consumer split:
//!
//! ```text
//! ConnectionFactory ──create──▶ Connection ──create_session──▶ Session
//!                                                                │
//!                                                     create_consumer
//!                                                                ▼
//!                                                       MessageConsumer ──receive(timeout)──▶ Message
//! ```
//!
//! A connection may be shared between many receivers; sessions and consumers
//! are owned by exactly one receiver at a time. Global (two-phase) units of work
//! additionally consume a [`TransactionManager`](api::TransactionManager).
//!
//! [`InMemoryBroker`](api::InMemoryBroker) implements the whole capability in
//! process and backs the test-suite and the demo binary.

pub(crate) mod error;
pub(crate) mod memory;
pub(crate) mod message;
pub(crate) mod traits;

pub mod api;

#[cfg(test)]
mod tests;
