//! In-process broker
//!
//! Implements the broker capability entirely in memory:
//! - Queues deliver each message to exactly one consumer, in FIFO order
//! - Topics copy each message into every subscription on the topic; durable
//!   subscriptions keep collecting while no consumer is attached
//! - A stopped connection delivers nothing, closing it interrupts blocked receives
//! - Transacted and client-acknowledge sessions keep delivered messages
//!   unsettled until commit/acknowledge; rollback, recover and close put them
//!   back at the head of their source flagged as redelivered
//!
//! Selectors match the message type exactly.

use crate::broker::error::{BrokerError, BrokerResult};
use crate::broker::message::{Destination, DestinationKind, Message, SessionMode};
use crate::broker::traits::{Connection, ConnectionFactory, ConsumerSpec, MessageConsumer, Session};
use crate::core::sync::{lock_or_recover, wait_timeout_or_recover};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SubscriptionKey {
    Durable(String),
    Transient(u64),
}

impl SubscriptionKey {
    /// Matches `name` with or without the client id scope
    fn is_durable_named(&self, name: &str) -> bool {
        match self {
            SubscriptionKey::Durable(scoped) => {
                scoped == name
                    || scoped
                        .rsplit_once(':')
                        .is_some_and(|(_, unscoped)| unscoped == name)
            }
            SubscriptionKey::Transient(_) => false,
        }
    }
}

#[derive(Debug)]
struct Subscription {
    topic: String,
    backlog: VecDeque<Message>,
    attached: bool,
}

/// Where a delivered message came from, so it can be put back
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Queue(String),
    Subscription(SubscriptionKey),
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Message>>,
    subscriptions: HashMap<SubscriptionKey, Subscription>,
}

impl BrokerState {
    fn take(&mut self, source: &Source, selector: Option<&str>) -> Option<Message> {
        let pending = match source {
            Source::Queue(name) => self.queues.get_mut(name)?,
            Source::Subscription(key) => &mut self.subscriptions.get_mut(key)?.backlog,
        };
        let position = pending
            .iter()
            .position(|message| selector.map_or(true, |s| s == message.header.message_type))?;
        pending.remove(position)
    }

    fn requeue(&mut self, unsettled: Vec<(Source, Message)>) {
        // Reverse so the oldest message ends up first again.
        for (source, mut message) in unsettled.into_iter().rev() {
            message.header.redelivered = true;
            match &source {
                Source::Queue(name) => self
                    .queues
                    .entry(name.clone())
                    .or_default()
                    .push_front(message),
                Source::Subscription(key) => {
                    if let Some(subscription) = self.subscriptions.get_mut(key) {
                        subscription.backlog.push_front(message);
                    }
                }
            }
        }
    }

    fn release_subscription(&mut self, key: &SubscriptionKey) {
        match key {
            SubscriptionKey::Transient(_) => {
                self.subscriptions.remove(key);
            }
            SubscriptionKey::Durable(_) => {
                if let Some(subscription) = self.subscriptions.get_mut(key) {
                    subscription.attached = false;
                }
            }
        }
    }
}

struct BrokerCore {
    state: Mutex<BrokerState>,
    changed: Condvar,
    next_message_id: AtomicU64,
    next_subscription_id: AtomicU64,
    connections_opened: AtomicU64,
}

impl BrokerCore {
    /// Wake every blocked receive so it re-examines its state
    fn notify(&self) {
        let _guard = lock_or_recover(&self.state);
        self.changed.notify_all();
    }
}

/// Shared in-process broker; clones refer to the same broker
#[derive(Clone)]
pub struct InMemoryBroker {
    core: Arc<BrokerCore>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            core: Arc::new(BrokerCore {
                state: Mutex::new(BrokerState::default()),
                changed: Condvar::new(),
                next_message_id: AtomicU64::new(1),
                next_subscription_id: AtomicU64::new(1),
                connections_opened: AtomicU64::new(0),
            }),
        }
    }

    /// Publish a message and return its assigned id
    pub fn publish(&self, destination: &Destination, mut message: Message) -> u64 {
        let message_id = self.core.next_message_id.fetch_add(1, Ordering::SeqCst);
        message.header.message_id = message_id;
        message.header.destination = destination.uri();

        let mut state = lock_or_recover(&self.core.state);
        match destination.kind() {
            DestinationKind::Queue => state
                .queues
                .entry(destination.name().to_string())
                .or_default()
                .push_back(message),
            DestinationKind::Topic => {
                for subscription in state
                    .subscriptions
                    .values_mut()
                    .filter(|s| s.topic == destination.name())
                {
                    subscription.backlog.push_back(message.clone());
                }
            }
        }
        self.core.changed.notify_all();
        message_id
    }

    /// Publish a plain text message
    pub fn send(&self, destination: &Destination, body: impl Into<String>) -> u64 {
        self.publish(destination, Message::new("text", body))
    }

    /// Messages waiting on a queue (unsettled deliveries excluded)
    pub fn queue_depth(&self, queue: &str) -> usize {
        lock_or_recover(&self.core.state)
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// Backlog of a durable subscription, if it exists
    pub fn subscription_backlog(&self, durable_name: &str) -> Option<usize> {
        lock_or_recover(&self.core.state)
            .subscriptions
            .iter()
            .find(|(key, _)| key.is_durable_named(durable_name))
            .map(|(_, subscription)| subscription.backlog.len())
    }

    /// Whether a consumer is currently attached to a durable subscription
    pub fn is_subscription_attached(&self, durable_name: &str) -> bool {
        lock_or_recover(&self.core.state)
            .subscriptions
            .iter()
            .any(|(key, subscription)| key.is_durable_named(durable_name) && subscription.attached)
    }

    /// Remove a durable subscription and its backlog
    pub fn unsubscribe(&self, durable_name: &str) -> bool {
        let mut state = lock_or_recover(&self.core.state);
        let before = state.subscriptions.len();
        state
            .subscriptions
            .retain(|key, _| !key.is_durable_named(durable_name));
        before != state.subscriptions.len()
    }

    /// Number of connections created so far
    pub fn connections_opened(&self) -> u64 {
        self.core.connections_opened.load(Ordering::SeqCst)
    }
}

impl ConnectionFactory for InMemoryBroker {
    fn create_connection(&self) -> BrokerResult<Arc<dyn Connection>> {
        let id = self.core.connections_opened.fetch_add(1, Ordering::SeqCst) + 1;
        log::trace!("In-memory broker opened connection {}", id);
        Ok(Arc::new(MemoryConnection {
            core: Arc::clone(&self.core),
            state: Arc::new(ConnectionState {
                id,
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                client_id: Mutex::new(None),
                sessions: Mutex::new(Vec::new()),
            }),
        }))
    }
}

struct ConnectionState {
    id: u64,
    started: AtomicBool,
    closed: AtomicBool,
    client_id: Mutex<Option<String>>,
    sessions: Mutex<Vec<Weak<SessionState>>>,
}

struct MemoryConnection {
    core: Arc<BrokerCore>,
    state: Arc<ConnectionState>,
}

impl MemoryConnection {
    fn ensure_open(&self) -> BrokerResult<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::closed(format!("connection {}", self.state.id)));
        }
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn set_client_id(&self, client_id: &str) -> BrokerResult<()> {
        self.ensure_open()?;
        *lock_or_recover(&self.state.client_id) = Some(client_id.to_string());
        Ok(())
    }

    fn start(&self) -> BrokerResult<()> {
        self.ensure_open()?;
        self.state.started.store(true, Ordering::SeqCst);
        self.core.notify();
        Ok(())
    }

    fn stop(&self) -> BrokerResult<()> {
        self.ensure_open()?;
        self.state.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> BrokerResult<()> {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.state.started.store(false, Ordering::SeqCst);
        let sessions: Vec<_> = lock_or_recover(&self.state.sessions)
            .drain(..)
            .filter_map(|weak| weak.upgrade())
            .collect();
        for session in sessions {
            session.close(&self.core);
        }
        self.core.notify();
        log::trace!("In-memory broker closed connection {}", self.state.id);
        Ok(())
    }

    fn create_session(&self, mode: SessionMode) -> BrokerResult<Box<dyn Session>> {
        self.ensure_open()?;
        let session = Arc::new(SessionState {
            mode,
            closed: AtomicBool::new(false),
            delivered: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        });
        let mut sessions = lock_or_recover(&self.state.sessions);
        sessions.retain(|weak| weak.strong_count() > 0);
        sessions.push(Arc::downgrade(&session));
        Ok(Box::new(MemorySession {
            core: Arc::clone(&self.core),
            connection: Arc::clone(&self.state),
            state: session,
        }))
    }
}

struct SessionState {
    mode: SessionMode,
    closed: AtomicBool,
    delivered: Mutex<Vec<(Source, Message)>>,
    subscriptions: Mutex<Vec<SubscriptionKey>>,
}

impl SessionState {
    fn take_unsettled(&self) -> Vec<(Source, Message)> {
        std::mem::take(&mut *lock_or_recover(&self.delivered))
    }

    fn close(&self, core: &BrokerCore) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let unsettled = self.take_unsettled();
        let keys = std::mem::take(&mut *lock_or_recover(&self.subscriptions));
        let mut state = lock_or_recover(&core.state);
        state.requeue(unsettled);
        for key in &keys {
            state.release_subscription(key);
        }
        core.changed.notify_all();
    }
}

struct MemorySession {
    core: Arc<BrokerCore>,
    connection: Arc<ConnectionState>,
    state: Arc<SessionState>,
}

impl MemorySession {
    fn ensure_open(&self) -> BrokerResult<()> {
        if self.state.closed.load(Ordering::SeqCst) || self.connection.closed.load(Ordering::SeqCst)
        {
            return Err(BrokerError::closed("session"));
        }
        Ok(())
    }

    fn redeliver_unsettled(&self) {
        let unsettled = self.state.take_unsettled();
        let mut state = lock_or_recover(&self.core.state);
        state.requeue(unsettled);
        self.core.changed.notify_all();
    }

    fn subscribe(&self, spec: &ConsumerSpec) -> SubscriptionKey {
        let topic = spec.destination.name().to_string();
        let key = match &spec.durable_name {
            Some(name) => {
                let scoped = match lock_or_recover(&self.connection.client_id).as_deref() {
                    Some(client_id) => format!("{}:{}", client_id, name),
                    None => name.clone(),
                };
                SubscriptionKey::Durable(scoped)
            }
            None => SubscriptionKey::Transient(
                self.core.next_subscription_id.fetch_add(1, Ordering::SeqCst),
            ),
        };

        let mut state = lock_or_recover(&self.core.state);
        let subscription = state
            .subscriptions
            .entry(key.clone())
            .or_insert_with(|| Subscription {
                topic: topic.clone(),
                backlog: VecDeque::new(),
                attached: false,
            });
        if subscription.topic != topic {
            // Re-pointing a durable subscription at another topic starts it afresh.
            subscription.topic = topic;
            subscription.backlog.clear();
        }
        subscription.attached = true;
        key
    }
}

impl Session for MemorySession {
    fn create_consumer(&self, spec: &ConsumerSpec) -> BrokerResult<Box<dyn MessageConsumer>> {
        self.ensure_open()?;
        let source = match spec.destination.kind() {
            DestinationKind::Queue => {
                if spec.durable_name.is_some() {
                    return Err(BrokerError::InvalidDestination {
                        destination: format!("{} (durable subscriptions need a topic)", spec.destination),
                    });
                }
                lock_or_recover(&self.core.state)
                    .queues
                    .entry(spec.destination.name().to_string())
                    .or_default();
                Source::Queue(spec.destination.name().to_string())
            }
            DestinationKind::Topic => {
                let key = self.subscribe(spec);
                lock_or_recover(&self.state.subscriptions).push(key.clone());
                Source::Subscription(key)
            }
        };

        Ok(Box::new(MemoryConsumer {
            core: Arc::clone(&self.core),
            connection: Arc::clone(&self.connection),
            session: Arc::clone(&self.state),
            source,
            selector: spec.selector.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn commit(&self) -> BrokerResult<()> {
        self.ensure_open()?;
        if !self.state.mode.is_transacted() {
            return Err(BrokerError::transaction("commit on a non-transacted session"));
        }
        self.state.take_unsettled();
        Ok(())
    }

    fn rollback(&self) -> BrokerResult<()> {
        self.ensure_open()?;
        if !self.state.mode.is_transacted() {
            return Err(BrokerError::transaction("rollback on a non-transacted session"));
        }
        self.redeliver_unsettled();
        Ok(())
    }

    fn recover(&self) -> BrokerResult<()> {
        self.ensure_open()?;
        if self.state.mode.is_transacted() {
            return Err(BrokerError::transaction("recover on a transacted session"));
        }
        self.redeliver_unsettled();
        Ok(())
    }

    fn acknowledge(&self, _message: &Message) -> BrokerResult<()> {
        self.ensure_open()?;
        if self.state.mode == SessionMode::ClientAcknowledge {
            self.state.take_unsettled();
        }
        Ok(())
    }

    fn close(&self) -> BrokerResult<()> {
        self.state.close(&self.core);
        Ok(())
    }
}

struct MemoryConsumer {
    core: Arc<BrokerCore>,
    connection: Arc<ConnectionState>,
    session: Arc<SessionState>,
    source: Source,
    selector: Option<String>,
    closed: AtomicBool,
}

impl MemoryConsumer {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
            || self.session.closed.load(Ordering::SeqCst)
            || self.connection.closed.load(Ordering::SeqCst)
    }
}

impl MessageConsumer for MemoryConsumer {
    fn receive(&self, timeout: Duration) -> BrokerResult<Option<Message>> {
        if self.is_closed() {
            return Err(BrokerError::closed("consumer"));
        }

        let deadline = Instant::now() + timeout;
        let mut state = lock_or_recover(&self.core.state);
        loop {
            if self.is_closed() {
                return Err(BrokerError::Interrupted);
            }
            if self.connection.started.load(Ordering::SeqCst) {
                if let Some(mut message) = state.take(&self.source, self.selector.as_deref()) {
                    message.header.delivery_count += 1;
                    if self.session.mode.requires_settlement() {
                        lock_or_recover(&self.session.delivered)
                            .push((self.source.clone(), message.clone()));
                    }
                    return Ok(Some(message));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = wait_timeout_or_recover(&self.core.changed, state, deadline - now);
        }
    }

    fn close(&self) -> BrokerResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Source::Subscription(key) = &self.source {
            lock_or_recover(&self.session.subscriptions).retain(|k| k != key);
            lock_or_recover(&self.core.state).release_subscription(key);
        }
        self.core.notify();
        Ok(())
    }
}
