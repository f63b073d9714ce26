//! Process-wide container table
//!
//! Lifecycle operations copy the affected handles out of the table first, so
//! slow container calls (initialize, the shutdown drain) never run under the
//! registry lock.

use crate::container::api::{ContainerDiagnostics, MessageContainer};
use crate::core::sync::{read_or_recover, write_or_recover};
use crate::registry::error::{RegistryError, RegistryResult};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Default)]
struct RegistryState {
    containers: BTreeMap<String, MessageContainer>,
    running: bool,
}

/// Containers keyed by destination URI
#[derive(Default)]
pub struct ContainerManager {
    state: RwLock<RegistryState>,
}

impl ContainerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        read_or_recover(&self.state).running
    }

    pub fn is_registered(&self, destination: &str) -> bool {
        read_or_recover(&self.state)
            .containers
            .contains_key(destination)
    }

    pub fn len(&self) -> usize {
        read_or_recover(&self.state).containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered destination URIs, sorted
    pub fn destinations(&self) -> Vec<String> {
        read_or_recover(&self.state)
            .containers
            .keys()
            .cloned()
            .collect()
    }

    pub fn get(&self, destination: &str) -> Option<MessageContainer> {
        read_or_recover(&self.state)
            .containers
            .get(destination)
            .cloned()
    }

    /// Add a container; on a started registry it is initialized right away
    pub fn register(&self, container: MessageContainer) -> RegistryResult<()> {
        let destination = container.uri().to_string();
        let running = {
            let mut state = write_or_recover(&self.state);
            if state.containers.contains_key(&destination) {
                return Err(RegistryError::Duplicate { destination });
            }
            state
                .containers
                .insert(destination.clone(), container.clone());
            state.running
        };
        log::debug!("Registered container for {}", destination);

        if running {
            if let Err(source) = container.initialize() {
                write_or_recover(&self.state).containers.remove(&destination);
                return Err(RegistryError::Container {
                    destination,
                    source,
                });
            }
        }
        Ok(())
    }

    /// Remove a container and shut it down
    pub fn unregister(&self, destination: &str) -> RegistryResult<MessageContainer> {
        let container = write_or_recover(&self.state)
            .containers
            .remove(destination)
            .ok_or_else(|| RegistryError::NotRegistered {
                destination: destination.to_string(),
            })?;
        container.shutdown();
        log::debug!("Unregistered container for {}", destination);
        Ok(container)
    }

    fn snapshot(&self) -> Vec<MessageContainer> {
        read_or_recover(&self.state)
            .containers
            .values()
            .cloned()
            .collect()
    }

    /// Initialize every container
    ///
    /// Every container is attempted; the first failure is returned.
    pub fn start(&self) -> RegistryResult<()> {
        let containers = {
            let mut state = write_or_recover(&self.state);
            state.running = true;
            state.containers.values().cloned().collect::<Vec<_>>()
        };
        log::info!("Starting {} container(s)", containers.len());

        let mut first_error = None;
        for container in containers {
            if let Err(source) = container.initialize() {
                log::error!("Could not start container for {}: {}", container.uri(), source);
                first_error.get_or_insert(RegistryError::Container {
                    destination: container.uri().to_string(),
                    source,
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stop every container, keeping it initialized
    pub fn pause(&self) {
        for container in self.snapshot() {
            container.stop();
        }
    }

    pub fn resume(&self) -> RegistryResult<()> {
        let mut first_error = None;
        for container in self.snapshot() {
            if let Err(source) = container.start() {
                log::error!("Could not resume container for {}: {}", container.uri(), source);
                first_error.get_or_insert(RegistryError::Container {
                    destination: container.uri().to_string(),
                    source,
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Shut every container down and empty the table
    ///
    /// Blocks until every receiver has finished its current execution.
    pub fn shutdown(&self) {
        let containers = {
            let mut state = write_or_recover(&self.state);
            state.running = false;
            std::mem::take(&mut state.containers)
        };
        if containers.is_empty() {
            return;
        }
        log::info!("Shutting down {} container(s)", containers.len());
        for container in containers.values() {
            container.shutdown();
        }
    }

    pub fn diagnostics(&self) -> Vec<ContainerDiagnostics> {
        self.snapshot()
            .iter()
            .map(MessageContainer::diagnostics)
            .collect()
    }
}

impl std::fmt::Debug for ContainerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = read_or_recover(&self.state);
        f.debug_struct("ContainerManager")
            .field("containers", &state.containers.keys().collect::<Vec<_>>())
            .field("running", &state.running)
            .finish()
    }
}
