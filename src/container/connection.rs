//! Connection ownership for one container
//!
//! With a cache level of `connection` or above every receiver uses one shared
//! connection owned here. Below that, each execution opens its own connection
//! and the receiver closes it afterwards. Every change to the shared
//! connection happens under one lock so create, close and refresh never race.

use crate::broker::api::{BrokerResult, Connection, ConnectionFactory};
use crate::container::config::CacheLevel;
use crate::container::monitor::{ContainerMonitor, MonitorEvent, MonitorEventType};
use crate::core::sync::lock_or_recover;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct SharedConnection {
    connection: Option<Arc<dyn Connection>>,
    /// Start requested; a connection created later is started on creation
    started: bool,
}

pub struct ConnectionManager {
    factory: Arc<dyn ConnectionFactory>,
    cache_level: CacheLevel,
    durable: bool,
    client_id: Option<String>,
    destination: String,
    monitor: Arc<dyn ContainerMonitor>,
    shared: Mutex<SharedConnection>,
    refreshes: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        cache_level: CacheLevel,
        durable: bool,
        client_id: Option<String>,
        destination: impl Into<String>,
        monitor: Arc<dyn ContainerMonitor>,
    ) -> Self {
        Self {
            factory,
            cache_level,
            durable,
            client_id,
            destination: destination.into(),
            monitor,
            shared: Mutex::new(SharedConnection::default()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn is_shared(&self) -> bool {
        self.cache_level.shares_connection()
    }

    pub fn cache_level(&self) -> CacheLevel {
        self.cache_level
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Refresh attempts made so far
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn has_shared_connection(&self) -> bool {
        lock_or_recover(&self.shared).connection.is_some()
    }

    pub fn is_shared_connection_started(&self) -> bool {
        lock_or_recover(&self.shared).started
    }

    fn open(&self) -> BrokerResult<Arc<dyn Connection>> {
        let connection = self.factory.create_connection()?;
        if let Some(client_id) = &self.client_id {
            if let Err(error) = connection.set_client_id(client_id) {
                let _ = connection.close();
                return Err(error);
            }
        }
        Ok(connection)
    }

    fn open_shared(&self, shared: &mut SharedConnection) -> BrokerResult<Arc<dyn Connection>> {
        let connection = self.open()?;
        if shared.started {
            connection.start()?;
        }
        shared.connection = Some(Arc::clone(&connection));
        log::debug!("Opened shared connection for {}", self.destination);
        Ok(connection)
    }

    /// Open the shared connection eagerly, without starting it
    pub fn start(&self) -> BrokerResult<()> {
        if !self.is_shared() {
            return Ok(());
        }
        let mut shared = lock_or_recover(&self.shared);
        if shared.connection.is_none() {
            self.open_shared(&mut shared)?;
        }
        Ok(())
    }

    /// Connection for one receive
    ///
    /// Without sharing this is a new, started connection the caller must
    /// close; otherwise it is the shared connection, created on first use.
    pub fn get_connection(&self) -> BrokerResult<Arc<dyn Connection>> {
        if !self.is_shared() {
            let connection = self.open()?;
            if let Err(error) = connection.start() {
                let _ = connection.close();
                return Err(error);
            }
            return Ok(connection);
        }

        let mut shared = lock_or_recover(&self.shared);
        match &shared.connection {
            Some(connection) => Ok(Arc::clone(connection)),
            None => self.open_shared(&mut shared),
        }
    }

    pub fn start_shared_connection(&self) {
        if !self.is_shared() {
            return;
        }
        let mut shared = lock_or_recover(&self.shared);
        shared.started = true;
        if let Some(connection) = &shared.connection {
            if let Err(error) = connection.start() {
                log::warn!("Could not start shared connection for {}: {}", self.destination, error);
                self.monitor.on_event(MonitorEvent::with_message(
                    MonitorEventType::StartConnectionError,
                    &self.destination,
                    error.to_string(),
                ));
            }
        }
    }

    pub fn stop_shared_connection(&self) {
        if !self.is_shared() {
            return;
        }
        let mut shared = lock_or_recover(&self.shared);
        shared.started = false;
        if let Some(connection) = &shared.connection {
            if let Err(error) = connection.stop() {
                log::warn!("Could not stop shared connection for {}: {}", self.destination, error);
                self.monitor.on_event(MonitorEvent::with_message(
                    MonitorEventType::StopConnectionError,
                    &self.destination,
                    error.to_string(),
                ));
            }
        }
    }

    /// Replace a failed connection; false when a new one could not be opened
    ///
    /// Without sharing there is nothing to replace, so this only checks that a
    /// connection can be opened again.
    pub fn refresh_connection(&self) -> bool {
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        let result = if self.is_shared() {
            let mut shared = lock_or_recover(&self.shared);
            if let Some(stale) = shared.connection.take() {
                if let Err(error) = stale.close() {
                    log::debug!("Ignoring close failure of stale connection: {}", error);
                }
            }
            self.open_shared(&mut shared).map(|_| ())
        } else {
            self.open().map(|connection| {
                let _ = connection.close();
            })
        };

        match result {
            Ok(()) => {
                log::info!("Connection for {} refreshed", self.destination);
                true
            }
            Err(error) => {
                log::warn!("Could not refresh connection for {}: {}", self.destination, error);
                self.monitor.on_event(MonitorEvent::with_message(
                    MonitorEventType::ConnectionError,
                    &self.destination,
                    error.to_string(),
                ));
                false
            }
        }
    }

    /// Close a connection handed out by [`get_connection`](Self::get_connection)
    ///
    /// The shared connection is left open; only `shutdown` closes it.
    pub fn release_connection(&self, connection: &Arc<dyn Connection>) {
        if self.is_shared() {
            return;
        }
        if let Err(error) = connection.close() {
            log::debug!("Ignoring connection close failure: {}", error);
        }
    }

    /// Close the shared connection; true if one was open
    pub fn shutdown(&self) -> bool {
        let mut shared = lock_or_recover(&self.shared);
        shared.started = false;
        match shared.connection.take() {
            Some(connection) => {
                if let Err(error) = connection.close() {
                    log::warn!("Could not close shared connection for {}: {}", self.destination, error);
                }
                true
            }
            None => false,
        }
    }
}
