//! Registry bookkeeping and lifecycle fan-out

use crate::broker::api::{InMemoryBroker, Message};
use crate::container::api::{
    BlockingTaskExecutor, ContainerConfig, ContainerState, HandlerError, MessageContainer,
};
use crate::registry::api::{container_manager, ContainerManager, RegistryError};
use serial_test::serial;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

fn container(runtime: &tokio::runtime::Runtime, destination: &str) -> MessageContainer {
    let config = ContainerConfig {
        receive_timeout_ms: 20,
        ..ContainerConfig::new(destination)
    };
    MessageContainer::builder(
        config,
        Arc::new(InMemoryBroker::new()),
        Arc::new(|_: &Message| -> Result<(), HandlerError> { Ok(()) }),
        Arc::new(BlockingTaskExecutor::new(runtime.handle().clone(), 8)),
    )
    .build()
    .unwrap()
}

#[test]
fn test_register_and_lookup() {
    let runtime = runtime();
    let manager = ContainerManager::new();
    assert!(manager.is_empty());

    manager.register(container(&runtime, "orders")).unwrap();
    manager.register(container(&runtime, "topic://prices")).unwrap();

    assert!(manager.is_registered("queue://orders"));
    assert!(!manager.is_registered("orders"));
    assert_eq!(manager.len(), 2);
    assert_eq!(
        manager.destinations(),
        vec!["queue://orders".to_string(), "topic://prices".to_string()]
    );
    assert_eq!(
        manager.get("topic://prices").unwrap().state(),
        ContainerState::Uninitialized
    );
    assert!(manager.get("queue://missing").is_none());
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let runtime = runtime();
    let manager = ContainerManager::new();
    manager.register(container(&runtime, "orders")).unwrap();

    let error = manager
        .register(container(&runtime, "queue://orders"))
        .unwrap_err();
    assert!(matches!(error, RegistryError::Duplicate { ref destination } if destination == "queue://orders"));
    assert_eq!(manager.len(), 1);
}

#[test]
fn test_unregister_shuts_container_down() {
    let runtime = runtime();
    let manager = ContainerManager::new();
    manager.register(container(&runtime, "orders")).unwrap();
    manager.start().unwrap();

    let removed = manager.unregister("queue://orders").unwrap();
    assert_eq!(removed.state(), ContainerState::Shutdown);
    assert!(!manager.is_registered("queue://orders"));
    assert!(matches!(
        manager.unregister("queue://orders"),
        Err(RegistryError::NotRegistered { .. })
    ));
}

#[test]
fn test_lifecycle_fans_out_to_every_container() {
    let runtime = runtime();
    let manager = ContainerManager::new();
    let orders = container(&runtime, "orders");
    let invoices = container(&runtime, "invoices");
    manager.register(orders.clone()).unwrap();
    manager.register(invoices.clone()).unwrap();

    manager.start().unwrap();
    assert!(manager.is_running());
    assert_eq!(orders.state(), ContainerState::Running);
    assert_eq!(invoices.state(), ContainerState::Running);

    manager.pause();
    assert_eq!(orders.state(), ContainerState::Stopped);
    assert_eq!(invoices.state(), ContainerState::Stopped);

    manager.resume().unwrap();
    assert_eq!(orders.state(), ContainerState::Running);

    let diagnostics = manager.diagnostics();
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics.iter().all(|d| d.receiver_count == 1));

    manager.shutdown();
    assert!(!manager.is_running());
    assert!(manager.is_empty());
    assert_eq!(orders.state(), ContainerState::Shutdown);
    assert_eq!(invoices.state(), ContainerState::Shutdown);
}

#[test]
fn test_register_on_running_registry_initializes() {
    let runtime = runtime();
    let manager = ContainerManager::new();
    manager.start().unwrap();

    let late = container(&runtime, "late");
    manager.register(late.clone()).unwrap();
    assert_eq!(late.state(), ContainerState::Running);
    manager.shutdown();
}

#[test]
fn test_register_of_shut_down_container_on_running_registry_fails() {
    let runtime = runtime();
    let manager = ContainerManager::new();
    manager.start().unwrap();

    let finished = container(&runtime, "finished");
    finished.shutdown();
    let error = manager.register(finished).unwrap_err();
    assert!(matches!(error, RegistryError::Container { .. }));
    assert!(!manager.is_registered("queue://finished"));
}

#[test]
#[serial]
fn test_global_registry_is_shared() {
    let runtime = runtime();
    let manager = container_manager();
    assert!(std::ptr::eq(manager, container_manager()));

    manager.register(container(&runtime, "global-orders")).unwrap();
    assert!(container_manager().is_registered("queue://global-orders"));
    manager.unregister("queue://global-orders").unwrap();
}
