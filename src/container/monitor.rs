//! Monitor events emitted by a container
//!
//! Monitoring is a best-effort side channel: a monitor must not block and its
//! failures are never fed back into the receive loop.

use std::fmt;
use std::time::SystemTime;
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MonitorEventType {
    /// A receiver execution failed
    ListenerError,
    /// The message handler failed for one message
    ReceiveError,
    /// A connection could not be opened or refreshed
    ConnectionError,
    StartConnectionError,
    StopConnectionError,
    /// The executor rejected a receiver, which was parked
    Reject,
    ScheduledReceiver,
    IncreaseReceivers,
    DecreaseReceivers,
    /// No receiver is left outside the paused list
    PauseError,
    /// Fewer receivers than the configured minimum are scheduled
    MinimumError,
}

impl MonitorEventType {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MonitorEventType::ListenerError
                | MonitorEventType::ReceiveError
                | MonitorEventType::ConnectionError
                | MonitorEventType::StartConnectionError
                | MonitorEventType::StopConnectionError
                | MonitorEventType::PauseError
        )
    }
}

impl fmt::Display for MonitorEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorEventType::ListenerError => "listener-error",
            MonitorEventType::ReceiveError => "receive-error",
            MonitorEventType::ConnectionError => "connection-error",
            MonitorEventType::StartConnectionError => "start-connection-error",
            MonitorEventType::StopConnectionError => "stop-connection-error",
            MonitorEventType::Reject => "reject",
            MonitorEventType::ScheduledReceiver => "scheduled-receiver",
            MonitorEventType::IncreaseReceivers => "increase-receivers",
            MonitorEventType::DecreaseReceivers => "decrease-receivers",
            MonitorEventType::PauseError => "pause-error",
            MonitorEventType::MinimumError => "minimum-error",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct MonitorEvent {
    pub event_type: MonitorEventType,
    pub timestamp: SystemTime,
    /// URI of the container's destination
    pub destination: String,
    /// Receiver count after the change, for scaling events
    pub count: Option<usize>,
    pub message: Option<String>,
}

impl MonitorEvent {
    pub fn new(event_type: MonitorEventType, destination: impl Into<String>) -> Self {
        Self {
            event_type,
            timestamp: SystemTime::now(),
            destination: destination.into(),
            count: None,
            message: None,
        }
    }

    pub fn with_count(
        event_type: MonitorEventType,
        destination: impl Into<String>,
        count: usize,
    ) -> Self {
        Self {
            count: Some(count),
            ..Self::new(event_type, destination)
        }
    }

    pub fn with_message(
        event_type: MonitorEventType,
        destination: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(event_type, destination)
        }
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.event_type, self.destination)?;
        if let Some(count) = self.count {
            write!(f, " (receivers: {})", count)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// Sink for container monitor events
pub trait ContainerMonitor: Send + Sync {
    fn on_event(&self, event: MonitorEvent);
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMonitor;

impl ContainerMonitor for LogMonitor {
    fn on_event(&self, event: MonitorEvent) {
        match event.event_type {
            t if t.is_error() => log::error!("{}", event),
            MonitorEventType::Reject | MonitorEventType::MinimumError => log::warn!("{}", event),
            MonitorEventType::IncreaseReceivers | MonitorEventType::DecreaseReceivers => {
                log::info!("{}", event)
            }
            _ => log::debug!("{}", event),
        }
    }
}

/// Forwards events to an unbounded channel
///
/// Events sent after the receiving half is dropped are discarded.
pub struct ChannelMonitor {
    sender: mpsc::UnboundedSender<MonitorEvent>,
}

impl ChannelMonitor {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ContainerMonitor for ChannelMonitor {
    fn on_event(&self, event: MonitorEvent) {
        let _ = self.sender.send(event);
    }
}
