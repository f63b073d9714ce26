//! Broker and transaction-manager capability traits

use crate::broker::error::BrokerResult;
use crate::broker::message::{Destination, Message, SessionMode};
use std::sync::Arc;
use std::time::Duration;

/// Opens connections to a broker
pub trait ConnectionFactory: Send + Sync {
    fn create_connection(&self) -> BrokerResult<Arc<dyn Connection>>;
}

/// A (possibly shared) broker connection
///
/// A newly created connection is stopped: consumers created on it receive
/// nothing until [`start`](Connection::start) is called.
pub trait Connection: Send + Sync {
    /// Assign the client identifier used to scope durable subscriptions
    fn set_client_id(&self, client_id: &str) -> BrokerResult<()>;

    fn start(&self) -> BrokerResult<()>;

    fn stop(&self) -> BrokerResult<()>;

    /// Close the connection; receives blocked on it fail with `Interrupted`
    fn close(&self) -> BrokerResult<()>;

    fn create_session(&self, mode: SessionMode) -> BrokerResult<Box<dyn Session>>;
}

/// What to consume and how
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerSpec {
    pub destination: Destination,
    /// Broker-side message filter
    pub selector: Option<String>,
    /// Suppress messages published on the consumer's own connection
    pub no_local: bool,
    /// Name of a durable topic subscription
    pub durable_name: Option<String>,
}

impl ConsumerSpec {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            selector: None,
            no_local: false,
            durable_name: None,
        }
    }
}

/// A single-threaded unit of broker work, owned by one receiver
pub trait Session: Send {
    fn create_consumer(&self, spec: &ConsumerSpec) -> BrokerResult<Box<dyn MessageConsumer>>;

    /// Commit a transacted session
    fn commit(&self) -> BrokerResult<()>;

    /// Roll back a transacted session; consumed messages become redeliverable
    fn rollback(&self) -> BrokerResult<()>;

    /// Redeliver every unacknowledged message of a client-acknowledge session
    fn recover(&self) -> BrokerResult<()>;

    /// Acknowledge `message` and everything consumed before it on this session
    fn acknowledge(&self, message: &Message) -> BrokerResult<()>;

    fn close(&self) -> BrokerResult<()>;
}

/// Pulls messages from one destination
pub trait MessageConsumer: Send {
    /// Block for up to `timeout`; `Ok(None)` when nothing arrived in time
    fn receive(&self, timeout: Duration) -> BrokerResult<Option<Message>>;

    fn close(&self) -> BrokerResult<()>;
}

/// Status of the transaction associated with the calling thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    MarkedRollback,
    Committed,
    RolledBack,
    NoTransaction,
    Unknown,
}

/// External two-phase transaction coordinator
///
/// Transactions are bound to the calling thread, so `begin`, the handler
/// invocation and `commit`/`rollback` all run on the receiver's thread.
pub trait TransactionManager: Send + Sync {
    /// Timeout applied to transactions begun afterwards on this thread
    fn set_timeout(&self, seconds: u32) -> BrokerResult<()>;

    fn begin(&self) -> BrokerResult<()>;

    fn status(&self) -> BrokerResult<TransactionStatus>;

    fn commit(&self) -> BrokerResult<()>;

    fn rollback(&self) -> BrokerResult<()>;
}
