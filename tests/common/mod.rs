//! Common test utilities and helpers
//!
//! Broker doubles, recording sinks and a harness that runs one container on a
//! tokio blocking pool.

#![allow(dead_code)]

use brokerpool::broker::api::{
    BrokerError, BrokerResult, Connection, ConnectionFactory, InMemoryBroker, Message, Session,
    SessionMode, TransactionManager, TransactionStatus,
};
use brokerpool::container::api::{
    BlockingTaskExecutor, ContainerConfig, ContainerMonitor, HandlerError, MessageContainer,
    MessageHandler, MonitorEvent, MonitorEventType,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(10);

/// Poll `condition` until it holds or the deadline passes
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn fast_config(destination: &str) -> ContainerConfig {
    ContainerConfig {
        receive_timeout_ms: 20,
        recovery_interval_ms: 20,
        backoff_period_ms: 50,
        ..ContainerConfig::new(destination)
    }
}

/// Broker connection that counts how often it is closed
struct CountingConnection {
    inner: Arc<dyn Connection>,
    closes: Arc<AtomicUsize>,
}

impl Connection for CountingConnection {
    fn set_client_id(&self, client_id: &str) -> BrokerResult<()> {
        self.inner.set_client_id(client_id)
    }

    fn start(&self) -> BrokerResult<()> {
        self.inner.start()
    }

    fn stop(&self) -> BrokerResult<()> {
        self.inner.stop()
    }

    fn close(&self) -> BrokerResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }

    fn create_session(&self, mode: SessionMode) -> BrokerResult<Box<dyn Session>> {
        self.inner.create_session(mode)
    }
}

/// In-memory broker whose availability can be switched off
pub struct FlakyConnectionFactory {
    broker: InMemoryBroker,
    failing: AtomicBool,
    attempts: AtomicUsize,
    closes: Arc<AtomicUsize>,
    live: Mutex<Vec<Weak<dyn Connection>>>,
}

impl FlakyConnectionFactory {
    pub fn new(broker: InMemoryBroker) -> Self {
        Self {
            broker,
            failing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            live: Mutex::new(Vec::new()),
        }
    }

    /// `close()` calls across every connection handed out
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Close every connection handed out so far
    pub fn break_connections(&self) {
        let live = std::mem::take(&mut *self.live.lock().unwrap());
        for connection in live.iter().filter_map(Weak::upgrade) {
            let _ = connection.close();
        }
    }
}

impl ConnectionFactory for FlakyConnectionFactory {
    fn create_connection(&self) -> BrokerResult<Arc<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BrokerError::connection("broker unavailable"));
        }
        let connection: Arc<dyn Connection> = Arc::new(CountingConnection {
            inner: self.broker.create_connection()?,
            closes: Arc::clone(&self.closes),
        });
        self.live.lock().unwrap().push(Arc::downgrade(&connection));
        Ok(connection)
    }
}

/// Keeps every monitor event
#[derive(Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingMonitor {
    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event_type: MonitorEventType) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }
}

impl ContainerMonitor for RecordingMonitor {
    fn on_event(&self, event: MonitorEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Collects message bodies in arrival order
#[derive(Default)]
pub struct RecordingHandler {
    bodies: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }
}

impl MessageHandler for RecordingHandler {
    fn on_message(&self, message: &Message) -> Result<(), HandlerError> {
        self.bodies.lock().unwrap().push(message.body.clone());
        Ok(())
    }
}

/// Thread-agnostic stand-in for a two-phase transaction coordinator
#[derive(Default)]
pub struct CountingTransactionManager {
    active: AtomicUsize,
    pub begun: AtomicUsize,
    pub committed: AtomicUsize,
    pub rolled_back: AtomicUsize,
}

impl TransactionManager for CountingTransactionManager {
    fn set_timeout(&self, _seconds: u32) -> BrokerResult<()> {
        Ok(())
    }

    fn begin(&self) -> BrokerResult<()> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn status(&self) -> BrokerResult<TransactionStatus> {
        Ok(if self.active.load(Ordering::SeqCst) > 0 {
            TransactionStatus::Active
        } else {
            TransactionStatus::NoTransaction
        })
    }

    fn commit(&self) -> BrokerResult<()> {
        self.committed.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> BrokerResult<()> {
        self.rolled_back.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One container on a dedicated tokio runtime
///
/// Dropping the harness shuts the container down before the runtime.
pub struct Harness {
    pub broker: InMemoryBroker,
    pub factory: Arc<FlakyConnectionFactory>,
    pub monitor: Arc<RecordingMonitor>,
    pub executor: Arc<BlockingTaskExecutor>,
    pub container: MessageContainer,
    runtime: Option<tokio::runtime::Runtime>,
}

impl Harness {
    pub fn new(config: ContainerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self::with_capacity(config, handler, 32)
    }

    pub fn with_capacity(
        config: ContainerConfig,
        handler: Arc<dyn MessageHandler>,
        capacity: usize,
    ) -> Self {
        Self::build(config, handler, capacity, |builder| builder)
    }

    pub fn build(
        config: ContainerConfig,
        handler: Arc<dyn MessageHandler>,
        capacity: usize,
        customize: impl FnOnce(
            brokerpool::container::api::MessageContainerBuilder,
        ) -> brokerpool::container::api::MessageContainerBuilder,
    ) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let broker = InMemoryBroker::new();
        let factory = Arc::new(FlakyConnectionFactory::new(broker.clone()));
        let monitor = Arc::new(RecordingMonitor::default());
        let executor = Arc::new(BlockingTaskExecutor::new(
            runtime.handle().clone(),
            capacity,
        ));
        let builder = MessageContainer::builder(
            config,
            factory.clone(),
            handler,
            executor.clone(),
        )
        .monitor(monitor.clone());
        let container = customize(builder).build().unwrap();
        Self {
            broker,
            factory,
            monitor,
            executor,
            container,
            runtime: Some(runtime),
        }
    }

    pub fn send(&self, body: &str) {
        self.broker.send(self.container.destination(), body);
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.container.shutdown();
        self.executor.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(WAIT);
        }
    }
}
