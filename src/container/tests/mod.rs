//! Container behaviour against the in-memory broker

mod receiving;

use crate::broker::api::{InMemoryBroker, Message, TransactionManager};
use crate::container::api::{
    ChannelMonitor, ContainerConfig, ExecutorError, HandlerError, MessageContainer,
    MessageHandler, MonitorEvent, MonitorEventType, Task, TaskExecutor,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

pub(super) const WAIT: Duration = Duration::from_secs(5);

/// Runs every task on its own thread, refusing on request
#[derive(Default)]
pub(super) struct ThreadExecutor {
    saturated: AtomicBool,
    closed: AtomicBool,
    submitted: AtomicUsize,
}

impl ThreadExecutor {
    pub(super) fn saturate(&self, saturated: bool) {
        self.saturated.store(saturated, Ordering::SeqCst);
    }

    pub(super) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub(super) fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl TaskExecutor for ThreadExecutor {
    fn submit(&self, task: Task) -> Result<(), ExecutorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecutorError::Shutdown { task });
        }
        if self.saturated.load(Ordering::SeqCst) {
            return Err(ExecutorError::Saturated { task });
        }
        self.submitted.fetch_add(1, Ordering::SeqCst);
        thread::spawn(task);
        Ok(())
    }
}

/// Collects message bodies in arrival order
#[derive(Default)]
pub(super) struct RecordingHandler {
    bodies: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub(super) fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    pub(super) fn count(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }
}

impl MessageHandler for RecordingHandler {
    fn on_message(&self, message: &Message) -> Result<(), HandlerError> {
        self.bodies.lock().unwrap().push(message.body.clone());
        Ok(())
    }
}

/// Holds handlers until opened
#[derive(Default)]
pub(super) struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    pub(super) fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.changed.notify_all();
    }

    pub(super) fn pass(&self) {
        let open = self.open.lock().unwrap();
        let _ = self.changed.wait_timeout_while(open, WAIT, |open| !*open).unwrap();
    }
}

pub(super) fn fast_config(destination: &str) -> ContainerConfig {
    ContainerConfig {
        receive_timeout_ms: 20,
        recovery_interval_ms: 20,
        backoff_period_ms: 40,
        ..ContainerConfig::new(destination)
    }
}

pub(super) struct Fixture {
    pub broker: InMemoryBroker,
    pub executor: Arc<ThreadExecutor>,
    pub container: MessageContainer,
    pub events: UnboundedReceiver<MonitorEvent>,
}

impl Fixture {
    pub(super) fn new(config: ContainerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self::build(config, handler, None)
    }

    pub(super) fn with_transaction_manager(
        config: ContainerConfig,
        handler: Arc<dyn MessageHandler>,
        manager: Arc<dyn TransactionManager>,
    ) -> Self {
        Self::build(config, handler, Some(manager))
    }

    fn build(
        config: ContainerConfig,
        handler: Arc<dyn MessageHandler>,
        manager: Option<Arc<dyn TransactionManager>>,
    ) -> Self {
        let broker = InMemoryBroker::new();
        let executor = Arc::new(ThreadExecutor::default());
        let (monitor, events) = ChannelMonitor::new();
        let mut builder = MessageContainer::builder(
            config,
            Arc::new(broker.clone()),
            handler,
            Arc::clone(&executor) as Arc<dyn TaskExecutor>,
        )
        .monitor(Arc::new(monitor));
        if let Some(manager) = manager {
            builder = builder.transaction_manager(manager);
        }
        let container = builder.build().unwrap();
        Self {
            broker,
            executor,
            container,
            events,
        }
    }

    pub(super) fn send(&self, body: &str) {
        self.broker.send(self.container.destination(), body);
    }

    /// Every event delivered so far
    pub(super) fn drain_events(&mut self) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub(super) fn saw(&mut self, event_type: MonitorEventType) -> bool {
        self.drain_events()
            .iter()
            .any(|event| event.event_type == event_type)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.container.shutdown();
    }
}

pub(super) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
