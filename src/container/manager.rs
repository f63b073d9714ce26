//! Adaptive message container
//!
//! The container owns the pool of receivers for one destination and decides
//! when it grows and shrinks:
//!
//! - **Growth** happens right after a receiver gets a message. If no receiver
//!   is idle and the pool is below `max-receivers`, one more is scheduled.
//! - **Shrinking** is done by the receivers themselves. After each execution a
//!   receiver that has been idle for `idle-limit` executions, while at least
//!   one other receiver is also idle, is held to `min-receivers` instead of
//!   `max-receivers`. It retires when the pool is above that bound.
//! - **Rejection** by the executor parks the receiver on the paused list; it is
//!   resubmitted on the next start or growth check.
//!
//! Pool membership, the paused list and the lifecycle flags live under one
//! mutex whose condition variable receivers wait on while the container is
//! stopped. Shared-connection changes are serialised separately by the
//! [`ConnectionManager`].

use crate::broker::api::{
    ConnectionFactory, ConsumerSpec, Destination, Message, SessionMode, TransactionManager,
};
use crate::container::config::{CacheLevel, ContainerConfig};
use crate::container::connection::ConnectionManager;
use crate::container::error::{ContainerError, ContainerResult, HandlerError};
use crate::container::executor::{ExecutorError, Task, TaskExecutor};
use crate::container::monitor::{ContainerMonitor, LogMonitor, MonitorEvent, MonitorEventType};
use crate::container::receiver::Receiver;
use crate::container::statistics::{ContainerStatistics, StatisticsSnapshot};
use crate::container::traits::{ExceptionListener, MessageHandler};
use crate::container::unit_of_work::UnitOfWork;
use crate::core::retry::{retry_blocking, BackoffPolicy};
use crate::core::sync::{
    handle_mutex_poison, lock_or_recover, wait_or_recover, wait_timeout_or_recover,
    wait_timeout_while_or_recover,
};
use crate::core::time::{SystemTimeProvider, TimeProvider};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

pub(crate) type ReceiverId = u64;

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerState {
    Uninitialized,
    Running,
    Stopped,
    Shutdown,
}

/// Read-only view of a container, taken under one lock
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContainerDiagnostics {
    pub destination: String,
    pub state: ContainerState,
    pub receiver_count: usize,
    pub active_receiver_count: usize,
    pub paused_task_count: usize,
    pub idle_receiver_count: usize,
    pub min_receivers: usize,
    pub max_receivers: usize,
    pub cache_level: String,
    pub durable: bool,
    pub session_mode: String,
    pub connection_refreshes: u64,
    pub statistics: StatisticsSnapshot,
}

#[derive(Debug, Clone, Copy)]
struct ReceiverSlot {
    idle: bool,
}

#[derive(Debug, Clone)]
struct Settings {
    receive_timeout: Duration,
    backoff: BackoffPolicy,
    min_receivers: usize,
    max_receivers: usize,
    idle_limit: u32,
    max_messages_per_execution: u32,
}

struct Lifecycle {
    active: bool,
    running: bool,
    shut_down: bool,
    receivers: HashMap<ReceiverId, ReceiverSlot>,
    paused: Vec<(ReceiverId, Task)>,
    active_count: usize,
    next_receiver_id: ReceiverId,
    settings: Settings,
}

impl Lifecycle {
    fn idle_count(&self) -> usize {
        self.receivers.values().filter(|slot| slot.idle).count()
    }

    fn should_reschedule(&self, idle_executions: u32) -> bool {
        let superfluous = idle_executions >= self.settings.idle_limit && self.idle_count() > 1;
        let bound = if superfluous {
            self.settings.min_receivers
        } else {
            self.settings.max_receivers
        };
        self.receivers.len() <= bound
    }

    fn state(&self) -> ContainerState {
        if self.shut_down {
            ContainerState::Shutdown
        } else if !self.active {
            ContainerState::Uninitialized
        } else if self.running {
            ContainerState::Running
        } else {
            ContainerState::Stopped
        }
    }
}

/// State shared between the container handle and its receivers
pub(crate) struct ContainerShared {
    pub(crate) destination: Destination,
    pub(crate) uri: String,
    pub(crate) session_mode: SessionMode,
    pub(crate) consumer_spec: ConsumerSpec,
    pub(crate) connections: ConnectionManager,
    pub(crate) unit_of_work: UnitOfWork,
    pub(crate) statistics: Arc<ContainerStatistics>,
    handler: Arc<dyn MessageHandler>,
    executor: Arc<dyn TaskExecutor>,
    monitor: Arc<dyn ContainerMonitor>,
    exception_listener: Option<Arc<dyn ExceptionListener>>,
    lifecycle: Mutex<Lifecycle>,
    lifecycle_changed: Condvar,
    recovery_lock: Mutex<()>,
    recovery_marker: AtomicU64,
}

impl ContainerShared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        lock_or_recover(&self.lifecycle)
    }

    fn try_lock(&self) -> ContainerResult<MutexGuard<'_, Lifecycle>> {
        handle_mutex_poison(self.lifecycle.lock(), |message| ContainerError::Internal {
            message,
        })
    }

    fn event(&self, event_type: MonitorEventType, message: Option<String>) -> MonitorEvent {
        match message {
            Some(message) => MonitorEvent::with_message(event_type, &self.uri, message),
            None => MonitorEvent::new(event_type, &self.uri),
        }
    }

    pub(crate) fn emit(&self, event_type: MonitorEventType, message: Option<String>) {
        self.monitor.on_event(self.event(event_type, message));
    }

    fn emit_all(&self, events: Vec<MonitorEvent>) {
        for event in events {
            self.monitor.on_event(event);
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().running
    }

    pub(crate) fn is_active(&self) -> bool {
        self.lock().active
    }

    pub(crate) fn receive_timeout(&self) -> Duration {
        self.lock().settings.receive_timeout
    }

    pub(crate) fn backoff_policy(&self) -> BackoffPolicy {
        self.lock().settings.backoff
    }

    pub(crate) fn max_messages_per_execution(&self) -> u32 {
        self.lock().settings.max_messages_per_execution
    }

    pub(crate) fn recovery_marker(&self) -> u64 {
        self.recovery_marker.load(Ordering::SeqCst)
    }

    pub(crate) fn enter_execution(&self) {
        let mut state = self.lock();
        state.active_count += 1;
        self.lifecycle_changed.notify_all();
    }

    pub(crate) fn leave_execution(&self) {
        let mut state = self.lock();
        state.active_count = state.active_count.saturating_sub(1);
        self.lifecycle_changed.notify_all();
    }

    pub(crate) fn mark_idle(&self, id: ReceiverId, idle: bool) {
        if let Some(slot) = self.lock().receivers.get_mut(&id) {
            slot.idle = idle;
        }
    }

    /// Block while the container is initialized but stopped
    ///
    /// A waiting receiver does not count as active. Returns false when the
    /// receiver should leave its loop: the container was shut down or the
    /// pool is above `max-receivers`.
    pub(crate) fn await_running(&self) -> bool {
        let mut state = self.lock();
        let mut waiting = false;
        while state.active && !state.running {
            if !waiting {
                state.active_count = state.active_count.saturating_sub(1);
                self.lifecycle_changed.notify_all();
                waiting = true;
            }
            state = wait_or_recover(&self.lifecycle_changed, state);
        }
        if waiting {
            state.active_count += 1;
        }
        state.active && state.receivers.len() <= state.settings.max_receivers
    }

    /// Sleep for `delay`, waking early if the container stops
    pub(crate) fn sleep_while_running(&self, delay: Duration) {
        let state = self.lock();
        let _ = wait_timeout_while_or_recover(&self.lifecycle_changed, state, delay, |state| {
            state.running
        });
    }

    pub(crate) fn invoke_handler(&self, message: &Message) -> Result<(), HandlerError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_message(message))) {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    pub(crate) fn report_listener_error(&self, error: &ContainerError) {
        log::warn!("Receiver execution on {} failed: {}", self.uri, error);
        self.emit(MonitorEventType::ListenerError, Some(error.to_string()));

        if let Some(listener) = &self.exception_listener {
            let broker_error = match error {
                ContainerError::Broker(broker_error) => Some(broker_error),
                ContainerError::Work(work_error) => Some(work_error.broker_error()),
                _ => None,
            };
            if let Some(broker_error) = broker_error {
                listener.on_exception(&self.uri, broker_error);
            }
        }
    }

    /// Refresh the connection unless another receiver already did so
    ///
    /// `snapshot` is the marker the receiver saw when it set up its session.
    /// Only a receiver whose snapshot is still current refreshes; the marker
    /// then advances so the rest of the failure episode is skipped.
    pub(crate) fn recover_if_current(&self, snapshot: u64, attempts: &mut u32) -> bool {
        let _recovery = lock_or_recover(&self.recovery_lock);
        if self.recovery_marker.load(Ordering::SeqCst) != snapshot {
            return false;
        }

        log::info!("Refreshing connection for {}", self.uri);
        let policy = self.backoff_policy();
        let refreshed = retry_blocking(
            "connection refresh",
            &policy,
            attempts,
            || self.is_running(),
            |delay| self.sleep_while_running(delay),
            || {
                if self.connections.refresh_connection() {
                    Ok(())
                } else {
                    Err("connection could not be re-established")
                }
            },
        );
        if refreshed.is_some() {
            *attempts = 0;
        }
        self.recovery_marker.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Resubmit parked receivers; those refused again stay parked
    fn resume_paused(
        &self,
        state: &mut Lifecycle,
        events: &mut Vec<MonitorEvent>,
        retired: &mut Vec<Task>,
    ) {
        if state.paused.is_empty() {
            return;
        }
        for (id, task) in std::mem::take(&mut state.paused) {
            match self.executor.submit(task) {
                Ok(()) => log::trace!("Resumed receiver {} on {}", id, self.uri),
                Err(ExecutorError::Saturated { task }) => state.paused.push((id, task)),
                Err(ExecutorError::Shutdown { task }) => {
                    state.receivers.remove(&id);
                    retired.push(task);
                    events.push(MonitorEvent::with_count(
                        MonitorEventType::DecreaseReceivers,
                        &self.uri,
                        state.receivers.len(),
                    ));
                }
            }
        }
    }

    /// Submit, park or hand back a receiver task
    ///
    /// `continuation` marks a receiver resubmitting itself from its own
    /// execution. `Err` returns the task when the receiver must retire instead.
    fn reschedule(
        &self,
        state: &mut Lifecycle,
        id: ReceiverId,
        task: Task,
        continuation: bool,
        events: &mut Vec<MonitorEvent>,
    ) -> Result<(), Task> {
        if state.running {
            let submitted = if continuation {
                self.executor.submit_continuation(task)
            } else {
                self.executor.submit(task)
            };
            match submitted {
                Ok(()) => Ok(()),
                Err(ExecutorError::Saturated { task }) => {
                    log::warn!("Executor rejected receiver {} on {}; parking it", id, self.uri);
                    events.push(self.event(MonitorEventType::Reject, Some("executor saturated".into())));
                    state.paused.push((id, task));
                    Ok(())
                }
                Err(ExecutorError::Shutdown { task }) => {
                    log::debug!("Executor shut down; retiring receiver {} on {}", id, self.uri);
                    Err(task)
                }
            }
        } else if state.active {
            state.paused.push((id, task));
            Ok(())
        } else {
            Err(task)
        }
    }

    fn schedule_new_receiver(
        self: &Arc<Self>,
        state: &mut Lifecycle,
        events: &mut Vec<MonitorEvent>,
        retired: &mut Vec<Task>,
    ) {
        let id = state.next_receiver_id;
        state.next_receiver_id += 1;
        state.receivers.insert(id, ReceiverSlot { idle: true });
        self.statistics.record_receivers(state.receivers.len());

        let task = Receiver::new(id, Arc::clone(self)).into_task();
        match self.reschedule(state, id, task, false, events) {
            Ok(()) => {
                log::debug!("Scheduled receiver {} on {}", id, self.uri);
                events.push(self.event(MonitorEventType::ScheduledReceiver, None));
                events.push(MonitorEvent::with_count(
                    MonitorEventType::IncreaseReceivers,
                    &self.uri,
                    state.receivers.len(),
                ));
            }
            Err(task) => {
                state.receivers.remove(&id);
                retired.push(task);
            }
        }
    }

    /// Grow the pool by one receiver when every receiver is busy
    pub(crate) fn schedule_new_receiver_if_appropriate(self: &Arc<Self>) {
        let mut events = Vec::new();
        let mut retired = Vec::new();
        {
            let mut state = self.lock();
            if !state.running {
                return;
            }
            self.resume_paused(&mut state, &mut events, &mut retired);
            if state.receivers.len() < state.settings.max_receivers && state.idle_count() == 0 {
                self.schedule_new_receiver(&mut state, &mut events, &mut retired);
            }
        }
        drop(retired);
        self.emit_all(events);
    }

    /// End of an execution: keep the receiver going or retire it
    pub(crate) fn reschedule_or_retire(self: &Arc<Self>, receiver: Receiver) {
        let id = receiver.id();
        let mut events = Vec::new();
        let retired = {
            let mut state = self.lock();
            let outcome = if state.should_reschedule(receiver.idle_executions()) {
                self.reschedule(&mut state, id, receiver.into_task(), true, &mut events)
            } else {
                Err(receiver.into_task())
            };

            match outcome {
                Ok(()) => {
                    if state.running {
                        let scheduled = state.receivers.len().saturating_sub(state.paused.len());
                        if scheduled < 1 {
                            events.push(self.event(
                                MonitorEventType::PauseError,
                                Some("every receiver is paused".into()),
                            ));
                        } else if scheduled < state.settings.min_receivers {
                            events.push(MonitorEvent::with_count(
                                MonitorEventType::MinimumError,
                                &self.uri,
                                scheduled,
                            ));
                        }
                    }
                    None
                }
                Err(task) => {
                    state.receivers.remove(&id);
                    self.lifecycle_changed.notify_all();
                    log::debug!(
                        "Retired receiver {} on {}; {} remaining",
                        id,
                        self.uri,
                        state.receivers.len()
                    );
                    events.push(MonitorEvent::with_count(
                        MonitorEventType::DecreaseReceivers,
                        &self.uri,
                        state.receivers.len(),
                    ));
                    Some(task)
                }
            }
        };
        // Dropping the task closes the retired receiver's broker objects.
        drop(retired);
        self.emit_all(events);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Builder for [`MessageContainer`]
pub struct MessageContainerBuilder {
    config: ContainerConfig,
    factory: Arc<dyn ConnectionFactory>,
    handler: Arc<dyn MessageHandler>,
    executor: Arc<dyn TaskExecutor>,
    monitor: Arc<dyn ContainerMonitor>,
    transaction_manager: Option<Arc<dyn TransactionManager>>,
    exception_listener: Option<Arc<dyn ExceptionListener>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl MessageContainerBuilder {
    pub fn monitor(mut self, monitor: Arc<dyn ContainerMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Required for `global` session mode
    pub fn transaction_manager(mut self, manager: Arc<dyn TransactionManager>) -> Self {
        self.transaction_manager = Some(manager);
        self
    }

    pub fn exception_listener(mut self, listener: Arc<dyn ExceptionListener>) -> Self {
        self.exception_listener = Some(listener);
        self
    }

    pub fn time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn build(self) -> ContainerResult<MessageContainer> {
        let mut config = self.config;
        let destination = config.validate()?;
        let uri = destination.uri();

        let statistics = Arc::new(ContainerStatistics::with_time_provider(self.time_provider));
        let unit_of_work = UnitOfWork::for_session_mode(
            config.session_mode,
            Arc::clone(&statistics),
            self.transaction_manager,
            config.transaction_timeout_secs,
        )
        .ok_or_else(|| {
            ContainerError::configuration(format!(
                "session-mode global on {} needs a transaction manager",
                uri
            ))
        })?;

        let connections = ConnectionManager::new(
            self.factory,
            config.cache_level,
            config.durable,
            config.client_id.clone(),
            uri.clone(),
            Arc::clone(&self.monitor),
        );

        let settings = Settings {
            receive_timeout: config.receive_timeout(),
            backoff: config.backoff_policy(),
            min_receivers: config.min_receivers,
            max_receivers: config.max_receivers,
            idle_limit: config.idle_limit,
            max_messages_per_execution: config.max_messages_per_execution,
        };

        log::debug!(
            "Built container for {} ({}, {}, receivers {}..={})",
            uri,
            config.session_mode,
            config.cache_level,
            settings.min_receivers,
            settings.max_receivers
        );

        Ok(MessageContainer {
            shared: Arc::new(ContainerShared {
                consumer_spec: config.consumer_spec(&destination),
                destination,
                uri,
                session_mode: config.session_mode,
                connections,
                unit_of_work,
                statistics,
                handler: self.handler,
                executor: self.executor,
                monitor: self.monitor,
                exception_listener: self.exception_listener,
                lifecycle: Mutex::new(Lifecycle {
                    active: false,
                    running: false,
                    shut_down: false,
                    receivers: HashMap::new(),
                    paused: Vec::new(),
                    active_count: 0,
                    next_receiver_id: 1,
                    settings,
                }),
                lifecycle_changed: Condvar::new(),
                recovery_lock: Mutex::new(()),
                recovery_marker: AtomicU64::new(0),
            }),
        })
    }
}

/// Self-scaling pool of receivers for one destination
///
/// Cloning yields another handle to the same container.
#[derive(Clone)]
pub struct MessageContainer {
    shared: Arc<ContainerShared>,
}

impl MessageContainer {
    pub fn builder(
        config: ContainerConfig,
        factory: Arc<dyn ConnectionFactory>,
        handler: Arc<dyn MessageHandler>,
        executor: Arc<dyn TaskExecutor>,
    ) -> MessageContainerBuilder {
        MessageContainerBuilder {
            config,
            factory,
            handler,
            executor,
            monitor: Arc::new(LogMonitor),
            transaction_manager: None,
            exception_listener: None,
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.shared.destination
    }

    /// Registry key
    pub fn uri(&self) -> &str {
        &self.shared.uri
    }

    /// Open the shared connection and schedule `min-receivers` receivers
    ///
    /// A shared connection that cannot be opened yet is reported and retried
    /// lazily by the receivers. Calling this on an initialized container does
    /// nothing.
    pub fn initialize(&self) -> ContainerResult<()> {
        let shared = &self.shared;
        {
            let state = shared.try_lock()?;
            if state.shut_down {
                return Err(ContainerError::Shutdown {
                    destination: shared.uri.clone(),
                });
            }
            if state.active {
                return Ok(());
            }
        }

        if let Err(error) = shared.connections.start() {
            log::warn!("Could not open shared connection for {}: {}", shared.uri, error);
            shared.emit(MonitorEventType::ConnectionError, Some(error.to_string()));
        }

        let mut events = Vec::new();
        let mut retired = Vec::new();
        {
            let mut state = shared.try_lock()?;
            if state.shut_down {
                return Err(ContainerError::Shutdown {
                    destination: shared.uri.clone(),
                });
            }
            if state.active {
                return Ok(());
            }
            state.active = true;
            state.running = true;
            for _ in 0..state.settings.min_receivers {
                shared.schedule_new_receiver(&mut state, &mut events, &mut retired);
            }
            shared.lifecycle_changed.notify_all();
        }
        drop(retired);

        shared.connections.start_shared_connection();
        shared.statistics.mark_started();
        shared.emit_all(events);
        log::info!("Container for {} initialized", shared.uri);
        Ok(())
    }

    /// Resume a stopped container, initializing it first if needed
    pub fn start(&self) -> ContainerResult<()> {
        let shared = &self.shared;
        let mut events = Vec::new();
        let mut retired = Vec::new();
        {
            let mut state = shared.try_lock()?;
            if state.shut_down {
                return Err(ContainerError::Shutdown {
                    destination: shared.uri.clone(),
                });
            }
            if !state.active {
                drop(state);
                return self.initialize();
            }
            if state.running {
                return Ok(());
            }
            state.running = true;
            shared.lifecycle_changed.notify_all();
            shared.resume_paused(&mut state, &mut events, &mut retired);
        }
        drop(retired);

        shared.connections.start_shared_connection();
        shared.emit_all(events);
        log::info!("Container for {} started", shared.uri);
        Ok(())
    }

    /// Stop dispatching; receivers park once their current receive returns
    pub fn stop(&self) {
        let shared = &self.shared;
        {
            let mut state = shared.lock();
            if !state.running {
                return;
            }
            state.running = false;
            shared.lifecycle_changed.notify_all();
        }
        shared.connections.stop_shared_connection();
        log::info!("Container for {} stopped", shared.uri);
    }

    /// Stop for good, wait for in-flight executions, close the shared connection
    ///
    /// Blocks until no receiver is executing. Must not be called from a
    /// message handler of the same container.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let (was_running, parked) = {
            let mut state = shared.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            let was_running = state.running;
            state.running = false;
            state.active = false;
            let parked = std::mem::take(&mut state.paused);
            for (id, _) in &parked {
                state.receivers.remove(id);
            }
            shared.lifecycle_changed.notify_all();
            (was_running, parked)
        };
        drop(parked);

        if was_running {
            shared.connections.stop_shared_connection();
        }

        {
            let mut state = shared.lock();
            while state.active_count > 0 {
                log::debug!(
                    "Waiting for {} receiver(s) on {} to finish",
                    state.active_count,
                    shared.uri
                );
                let timeout = state.settings.receive_timeout;
                state = wait_timeout_or_recover(&shared.lifecycle_changed, state, timeout);
            }
        }

        shared.connections.shutdown();
        log::info!("Container for {} shut down", shared.uri);
    }

    pub fn state(&self) -> ContainerState {
        self.shared.lock().state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn receive_timeout(&self) -> Duration {
        self.shared.receive_timeout()
    }

    pub fn set_receive_timeout(&self, timeout: Duration) -> ContainerResult<()> {
        if timeout.is_zero() {
            return Err(ContainerError::configuration("receive timeout must be greater than zero"));
        }
        self.shared.try_lock()?.settings.receive_timeout = timeout;
        Ok(())
    }

    pub fn recovery_interval(&self) -> Duration {
        self.shared.backoff_policy().recovery_interval
    }

    pub fn set_recovery_interval(&self, interval: Duration) -> ContainerResult<()> {
        if interval.is_zero() {
            return Err(ContainerError::configuration(
                "recovery interval must be greater than zero",
            ));
        }
        self.shared.try_lock()?.settings.backoff.recovery_interval = interval;
        Ok(())
    }

    pub fn backoff_period(&self) -> Duration {
        self.shared.backoff_policy().backoff_period
    }

    pub fn set_backoff_period(&self, period: Duration) -> ContainerResult<()> {
        self.shared.try_lock()?.settings.backoff.backoff_period = period;
        Ok(())
    }

    pub fn min_receivers(&self) -> usize {
        self.shared.lock().settings.min_receivers
    }

    /// Raises `max-receivers` too when it would fall below the new minimum
    pub fn set_min_receivers(&self, min: usize) -> ContainerResult<()> {
        if min == 0 {
            return Err(ContainerError::configuration("min-receivers must be at least 1"));
        }
        let mut state = self.shared.try_lock()?;
        state.settings.min_receivers = min;
        if state.settings.max_receivers < min {
            state.settings.max_receivers = min;
        }
        Ok(())
    }

    pub fn max_receivers(&self) -> usize {
        self.shared.lock().settings.max_receivers
    }

    /// Values below `min-receivers` are raised to it
    pub fn set_max_receivers(&self, max: usize) -> ContainerResult<()> {
        if max == 0 {
            return Err(ContainerError::configuration("max-receivers must be at least 1"));
        }
        let mut state = self.shared.try_lock()?;
        state.settings.max_receivers = max.max(state.settings.min_receivers);
        Ok(())
    }

    pub fn idle_limit(&self) -> u32 {
        self.shared.lock().settings.idle_limit
    }

    pub fn set_idle_limit(&self, limit: u32) -> ContainerResult<()> {
        if limit == 0 {
            return Err(ContainerError::configuration("idle-limit must be at least 1"));
        }
        self.shared.try_lock()?.settings.idle_limit = limit;
        Ok(())
    }

    pub fn max_messages_per_execution(&self) -> u32 {
        self.shared.max_messages_per_execution()
    }

    /// Zero keeps receivers looping until the container stops
    pub fn set_max_messages_per_execution(&self, limit: u32) -> ContainerResult<()> {
        self.shared.try_lock()?.settings.max_messages_per_execution = limit;
        Ok(())
    }

    pub fn receiver_count(&self) -> usize {
        self.shared.lock().receivers.len()
    }

    pub fn active_receiver_count(&self) -> usize {
        self.shared.lock().active_count
    }

    pub fn paused_task_count(&self) -> usize {
        self.shared.lock().paused.len()
    }

    pub fn idle_receiver_count(&self) -> usize {
        self.shared.lock().idle_count()
    }

    pub fn cache_level(&self) -> CacheLevel {
        self.shared.connections.cache_level()
    }

    pub fn is_durable(&self) -> bool {
        self.shared.connections.is_durable()
    }

    pub fn session_mode(&self) -> SessionMode {
        self.shared.session_mode
    }

    pub fn statistics(&self) -> &ContainerStatistics {
        &self.shared.statistics
    }

    pub fn diagnostics(&self) -> ContainerDiagnostics {
        let shared = &self.shared;
        let state = shared.lock();
        ContainerDiagnostics {
            destination: shared.uri.clone(),
            state: state.state(),
            receiver_count: state.receivers.len(),
            active_receiver_count: state.active_count,
            paused_task_count: state.paused.len(),
            idle_receiver_count: state.idle_count(),
            min_receivers: state.settings.min_receivers,
            max_receivers: state.settings.max_receivers,
            cache_level: shared.connections.cache_level().label().to_string(),
            durable: shared.connections.is_durable(),
            session_mode: shared.session_mode.label().to_string(),
            connection_refreshes: shared.connections.refresh_count(),
            statistics: shared.statistics.snapshot(),
        }
    }
}

impl std::fmt::Debug for MessageContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContainer")
            .field("destination", &self.shared.uri)
            .field("state", &self.state())
            .finish()
    }
}
