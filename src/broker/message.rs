//! Message, destination and session-mode types

use crate::broker::error::BrokerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Kind of broker endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestinationKind {
    /// Point-to-point: each message goes to exactly one consumer
    #[default]
    Queue,
    /// Publish/subscribe: each subscription receives every message
    Topic,
}

impl DestinationKind {
    fn scheme(&self) -> &'static str {
        match self {
            DestinationKind::Queue => "queue",
            DestinationKind::Topic => "topic",
        }
    }
}

/// A named broker endpoint
///
/// Destinations are identified by a URI of the form `queue://name` or
/// `topic://name`; a bare name is read as a queue.
///
/// ```rust
/// use brokerpool::broker::api::{Destination, DestinationKind};
///
/// let orders: Destination = "topic://orders".parse().unwrap();
/// assert_eq!(orders.kind(), DestinationKind::Topic);
/// assert_eq!(orders.uri(), "topic://orders");
/// assert_eq!("invoices".parse::<Destination>().unwrap().uri(), "queue://invoices");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    name: String,
    kind: DestinationKind,
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Queue,
        }
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Topic,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    pub fn is_topic(&self) -> bool {
        self.kind == DestinationKind::Topic
    }

    /// Identity used to key containers in the registry
    pub fn uri(&self) -> String {
        format!("{}://{}", self.kind.scheme(), self.name)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.kind.scheme(), self.name)
    }
}

impl FromStr for Destination {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = match s.split_once("://") {
            Some(("queue", name)) => (DestinationKind::Queue, name),
            Some(("topic", name)) => (DestinationKind::Topic, name),
            Some(_) => {
                return Err(BrokerError::InvalidDestination {
                    destination: s.to_string(),
                })
            }
            None => (DestinationKind::Queue, s),
        };

        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(BrokerError::InvalidDestination {
                destination: s.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            kind,
        })
    }
}

/// Acknowledgement / transaction mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// The broker acknowledges on delivery
    #[default]
    AutoAcknowledge,
    /// Lazy automatic acknowledgement; duplicates are tolerated
    DupsOkAcknowledge,
    /// The container acknowledges after the handler returns
    ClientAcknowledge,
    /// Local session transaction, committed after the handler returns
    Transacted,
    /// The session takes part in an externally managed two-phase transaction
    Global,
}

impl SessionMode {
    pub fn is_transacted(&self) -> bool {
        matches!(self, SessionMode::Transacted)
    }

    /// Whether delivered messages stay unsettled until the session settles them
    ///
    /// Global sessions are settled by the external coordinator, not the session.
    pub fn requires_settlement(&self) -> bool {
        matches!(self, SessionMode::ClientAcknowledge | SessionMode::Transacted)
    }

    /// Diagnostic label
    pub fn label(&self) -> &'static str {
        match self {
            SessionMode::AutoAcknowledge => "AUTO_ACKNOWLEDGE",
            SessionMode::DupsOkAcknowledge => "DUPS_OK_ACKNOWLEDGE",
            SessionMode::ClientAcknowledge => "CLIENT_ACKNOWLEDGE",
            SessionMode::Transacted => "SESSION_TRANSACTED",
            SessionMode::Global => "GLOBAL_TRANSACTION",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Header information populated by the broker
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    /// Broker-assigned identifier, unique per broker
    pub message_id: u64,
    /// Timestamp when the message was published
    pub timestamp: SystemTime,
    /// URI of the destination the message was published to
    pub destination: String,
    /// Application-defined type, matched by message selectors
    pub message_type: String,
    /// Set once the message has been delivered before and rolled back
    pub redelivered: bool,
    /// Number of times the message has been handed to a consumer
    pub delivery_count: u32,
}

/// A message pulled from a destination
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub body: String,
}

impl Message {
    /// Create an unpublished message; the broker fills in id and destination
    pub fn new(message_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            header: MessageHeader {
                message_id: 0,
                timestamp: SystemTime::now(),
                destination: String::new(),
                message_type: message_type.into(),
                redelivered: false,
                delivery_count: 0,
            },
            body: body.into(),
        }
    }

    pub fn message_id(&self) -> u64 {
        self.header.message_id
    }

    pub fn is_redelivered(&self) -> bool {
        self.header.redelivered
    }
}
