//! Broker outages and connection refresh

mod common;

use brokerpool::broker::api::{
    BrokerError, BrokerResult, SessionMode, TransactionManager, TransactionStatus,
};
use brokerpool::container::api::{CacheLevel, ContainerConfig, MonitorEventType};
use common::{fast_config, wait_until, Harness, RecordingHandler};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Coordinator that refuses to begin any transaction
struct UnavailableCoordinator;

impl TransactionManager for UnavailableCoordinator {
    fn set_timeout(&self, _seconds: u32) -> BrokerResult<()> {
        Ok(())
    }

    fn begin(&self) -> BrokerResult<()> {
        Err(BrokerError::transaction("coordinator unavailable"))
    }

    fn status(&self) -> BrokerResult<TransactionStatus> {
        Ok(TransactionStatus::NoTransaction)
    }

    fn commit(&self) -> BrokerResult<()> {
        Ok(())
    }

    fn rollback(&self) -> BrokerResult<()> {
        Ok(())
    }
}

#[test]
fn test_outage_is_survived_and_consumption_resumes() {
    let handler = Arc::new(RecordingHandler::default());
    let harness = Harness::new(fast_config("orders"), handler.clone());
    harness.container.initialize().unwrap();
    harness.send("before");
    assert!(wait_until(|| handler.count() == 1));

    harness.factory.set_failing(true);
    harness.factory.break_connections();
    assert!(wait_until(|| harness.monitor.count(MonitorEventType::ListenerError) >= 1));
    assert!(wait_until(|| harness.monitor.count(MonitorEventType::ConnectionError) >= 2));

    harness.factory.set_failing(false);
    harness.send("after");
    assert!(wait_until(|| handler.count() == 2));
    assert_eq!(handler.bodies(), vec!["before", "after"]);
    assert!(harness.container.diagnostics().connection_refreshes >= 2);
}

#[test]
fn test_one_refresh_per_failure_episode() {
    let config = ContainerConfig {
        min_receivers: 3,
        max_receivers: 3,
        ..fast_config("orders")
    };
    let harness = Harness::new(config, Arc::new(RecordingHandler::default()));
    harness.container.initialize().unwrap();
    assert!(wait_until(|| harness.container.active_receiver_count() == 3));
    std::thread::sleep(Duration::from_millis(100));
    let opened_before = harness.factory.attempts();

    harness.factory.break_connections();
    assert!(wait_until(|| harness.monitor.count(MonitorEventType::ListenerError) == 3));
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(harness.container.diagnostics().connection_refreshes, 1);
    assert_eq!(harness.factory.attempts(), opened_before + 1);
}

#[test]
fn test_exception_listener_sees_broker_failures() {
    let seen: Arc<Mutex<Vec<(String, BrokerError)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let harness = Harness::build(
        fast_config("orders"),
        Arc::new(RecordingHandler::default()),
        8,
        move |builder| {
            builder.exception_listener(Arc::new(move |destination: &str, error: &BrokerError| {
                sink.lock()
                    .unwrap()
                    .push((destination.to_string(), error.clone()));
            }))
        },
    );
    harness.container.initialize().unwrap();
    assert!(wait_until(|| harness.container.active_receiver_count() == 1));
    std::thread::sleep(Duration::from_millis(50));

    harness.factory.break_connections();
    assert!(wait_until(|| !seen.lock().unwrap().is_empty()));
    let (destination, _) = seen.lock().unwrap()[0].clone();
    assert_eq!(destination, "queue://orders");
}

#[test]
fn test_unreachable_broker_at_startup_is_reported_not_fatal() {
    let handler = Arc::new(RecordingHandler::default());
    let harness = Harness::new(fast_config("orders"), handler.clone());
    harness.factory.set_failing(true);

    harness.container.initialize().unwrap();
    assert!(harness.monitor.count(MonitorEventType::ConnectionError) >= 1);

    harness.factory.set_failing(false);
    harness.send("late");
    assert!(wait_until(|| handler.count() == 1));
}

#[test]
fn test_per_execution_connections_recover() {
    let config = ContainerConfig {
        cache_level: CacheLevel::None,
        ..fast_config("orders")
    };
    let handler = Arc::new(RecordingHandler::default());
    let harness = Harness::new(config, handler.clone());
    harness.container.initialize().unwrap();

    harness.factory.set_failing(true);
    assert!(wait_until(|| harness.monitor.count(MonitorEventType::ListenerError) >= 1));
    harness.factory.set_failing(false);

    harness.send("recovered");
    assert!(wait_until(|| handler.count() == 1));
}

#[test]
fn test_consecutive_failures_back_off_between_attempts() {
    let interval = Duration::from_millis(800);
    let config = ContainerConfig {
        session_mode: SessionMode::Global,
        recovery_interval_ms: interval.as_millis() as u64,
        ..fast_config("payments")
    };
    let harness = Harness::build(config, Arc::new(RecordingHandler::default()), 8, |builder| {
        builder.transaction_manager(Arc::new(UnavailableCoordinator))
    });
    let started = SystemTime::now();
    harness.container.initialize().unwrap();

    assert!(wait_until(|| harness.monitor.count(MonitorEventType::ListenerError) >= 3));
    let failures: Vec<SystemTime> = harness
        .monitor
        .events()
        .into_iter()
        .filter(|event| event.event_type == MonitorEventType::ListenerError)
        .map(|event| event.timestamp)
        .collect();

    // The first failure is reported without waiting
    assert!(failures[0].duration_since(started).unwrap() < interval);
    // Every later one waits out the recovery interval first
    let slack = Duration::from_millis(100);
    for pair in failures[..3].windows(2) {
        let gap = pair[1].duration_since(pair[0]).unwrap();
        assert!(gap + slack >= interval, "gap between failures was {:?}", gap);
    }
}
