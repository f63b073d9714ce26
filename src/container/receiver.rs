//! Receiver run loop
//!
//! A receiver is one logical worker. Each scheduled execution performs a
//! bounded number of receives (or loops until the container stops when the
//! bound is zero), then hands itself back to the container, which either
//! resubmits it to the executor, parks it, or retires it.
//!
//! Broker objects created by a receiver belong to it alone. Which of them
//! survive between receives depends on the cache level:
//!
//! | cache level            | consumer + session | own connection |
//! |------------------------|--------------------|----------------|
//! | `none`                 | closed             | closed         |
//! | `connection`           | closed             | (shared)       |
//! | `administered-objects` | kept               | (shared)       |
//!
//! Any failure closes everything the receiver holds. The shared connection
//! is never closed by a receiver.

use crate::broker::api::{BrokerError, Connection, MessageConsumer, Session};
use crate::container::config::CacheLevel;
use crate::container::error::{ContainerError, ContainerResult};
use crate::container::executor::Task;
use crate::container::manager::{ContainerShared, ReceiverId};
use crate::container::monitor::MonitorEventType;
use std::sync::Arc;

pub(crate) struct Receiver {
    id: ReceiverId,
    container: Arc<ContainerShared>,
    connection: Option<Arc<dyn Connection>>,
    session: Option<Box<dyn Session>>,
    consumer: Option<Box<dyn MessageConsumer>>,
    idle_executions: u32,
    last_execution_succeeded: bool,
    recovery_attempts: u32,
    recovery_marker: u64,
}

impl Receiver {
    pub(crate) fn new(id: ReceiverId, container: Arc<ContainerShared>) -> Self {
        let recovery_marker = container.recovery_marker();
        Self {
            id,
            container,
            connection: None,
            session: None,
            consumer: None,
            idle_executions: 0,
            last_execution_succeeded: true,
            recovery_attempts: 0,
            recovery_marker,
        }
    }

    pub(crate) fn id(&self) -> ReceiverId {
        self.id
    }

    pub(crate) fn idle_executions(&self) -> u32 {
        self.idle_executions
    }

    pub(crate) fn into_task(self) -> Task {
        Box::new(move || self.run())
    }

    /// One scheduled execution
    pub(crate) fn run(mut self) {
        let container = Arc::clone(&self.container);
        container.enter_execution();

        let outcome = if container.max_messages_per_execution() == 0 {
            self.execute_ongoing_loop()
        } else {
            self.execute_bounded()
        };
        let received = match outcome {
            Ok(received) => received,
            Err(error) => {
                self.handle_failure(error);
                false
            }
        };

        container.leave_execution();
        if received {
            self.idle_executions = 0;
        } else {
            self.idle_executions = self.idle_executions.saturating_add(1);
        }
        container.reschedule_or_retire(self);
    }

    fn execute_bounded(&mut self) -> ContainerResult<bool> {
        let limit = self.container.max_messages_per_execution();
        let mut received = false;
        let mut count = 0;
        while count < limit && self.container.is_running() {
            received = self.invoke_listener()? || received;
            count += 1;
        }
        Ok(received)
    }

    fn execute_ongoing_loop(&mut self) -> ContainerResult<bool> {
        let mut received = false;
        while self.container.await_running() {
            received = self.invoke_listener()? || received;
        }
        Ok(received)
    }

    fn invoke_listener(&mut self) -> ContainerResult<bool> {
        let received = self.receive_and_execute()?;
        self.release_resources(false);
        self.last_execution_succeeded = true;
        self.recovery_attempts = 0;
        Ok(received)
    }

    fn receive_and_execute(&mut self) -> ContainerResult<bool> {
        let container = Arc::clone(&self.container);
        container.unit_of_work.begin()?;
        match self.receive_within_work(&container) {
            Ok(received) => Ok(received),
            Err(error) => {
                if let Err(rollback_error) = container.unit_of_work.rollback(self.session.as_deref()) {
                    log::debug!(
                        "Rollback after failed receive on {} also failed: {}",
                        container.uri,
                        rollback_error
                    );
                }
                Err(error)
            }
        }
    }

    fn receive_within_work(&mut self, container: &Arc<ContainerShared>) -> ContainerResult<bool> {
        self.ensure_consumer(container)?;
        let (Some(session), Some(consumer)) = (self.session.as_deref(), self.consumer.as_deref())
        else {
            return Err(ContainerError::Internal {
                message: "receiver has no consumer after setup".to_string(),
            });
        };
        let work = &container.unit_of_work;

        let message = match consumer.receive(container.receive_timeout()) {
            Ok(message) => message,
            Err(BrokerError::Interrupted) if !container.is_active() => {
                log::trace!("Receive on {} interrupted by shutdown", container.uri);
                None
            }
            Err(error) => return Err(error.into()),
        };

        let Some(message) = message else {
            container.mark_idle(self.id, true);
            work.end(session, None)?;
            return Ok(false);
        };

        if !container.is_running() {
            // Arrived as the container stopped; leave it for redelivery.
            container.mark_idle(self.id, true);
            work.rollback(Some(session))?;
            return Ok(false);
        }

        container.mark_idle(self.id, false);
        container.schedule_new_receiver_if_appropriate();

        match container.invoke_handler(&message) {
            Ok(()) => {
                work.end(session, Some(&message))?;
                container.statistics.increment_messages_received();
                Ok(true)
            }
            Err(error) => {
                let cause = error.root_cause();
                log::warn!(
                    "Handler failed for message {} on {}: {}",
                    message.message_id(),
                    container.uri,
                    cause
                );
                container.emit(MonitorEventType::ReceiveError, Some(cause));
                work.rollback(Some(session))?;
                Ok(false)
            }
        }
    }

    fn ensure_consumer(&mut self, container: &ContainerShared) -> Result<(), BrokerError> {
        if self.session.is_none() {
            // Snapshot before the connection is fetched so a refresh that
            // races with this setup is never mistaken for a later one.
            self.recovery_marker = container.recovery_marker();
            let connection = container.connections.get_connection()?;
            if !container.connections.is_shared() {
                self.connection = Some(Arc::clone(&connection));
            }
            self.session = Some(connection.create_session(container.session_mode)?);
        }
        if self.consumer.is_none() {
            if let Some(session) = self.session.as_deref() {
                self.consumer = Some(session.create_consumer(&container.consumer_spec)?);
            }
        }
        Ok(())
    }

    fn release_resources(&mut self, force: bool) {
        let cache_level = self.container.connections.cache_level();
        if force || !cache_level.caches_consumer() {
            if let Some(consumer) = self.consumer.take() {
                if let Err(error) = consumer.close() {
                    log::trace!("Ignoring consumer close failure: {}", error);
                }
            }
            if let Some(session) = self.session.take() {
                if let Err(error) = session.close() {
                    log::trace!("Ignoring session close failure: {}", error);
                }
            }
        }
        if force || cache_level == CacheLevel::None {
            if let Some(connection) = self.connection.take() {
                self.container.connections.release_connection(&connection);
            }
        }
    }

    fn handle_failure(&mut self, error: ContainerError) {
        let container = Arc::clone(&self.container);
        self.release_resources(true);

        if !self.last_execution_succeeded {
            let delay = container.backoff_policy().delay_for(self.recovery_attempts);
            log::debug!(
                "Receiver {} on {} failed twice in a row; backing off for {:?}",
                self.id,
                container.uri,
                delay
            );
            self.recovery_attempts = self.recovery_attempts.saturating_add(1);
            container.sleep_while_running(delay);
        }
        self.last_execution_succeeded = false;

        container.report_listener_error(&error);
        if !container.recover_if_current(self.recovery_marker, &mut self.recovery_attempts) {
            log::debug!(
                "Connection for {} already refreshed by another receiver",
                container.uri
            );
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.release_resources(true);
    }
}
