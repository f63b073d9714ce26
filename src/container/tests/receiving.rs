//! Dispatch, settlement and handler failures

use super::{fast_config, wait_until, Fixture, RecordingHandler};
use crate::broker::api::{
    BrokerError, BrokerResult, Message, SessionMode, TransactionManager, TransactionStatus,
};
use crate::container::api::{
    CacheLevel, ContainerConfig, HandlerError, MessageHandler, MonitorEventType,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fails the first delivery of every message
#[derive(Default)]
struct FailFirstDelivery {
    accepted: Mutex<Vec<(String, bool)>>,
}

impl MessageHandler for FailFirstDelivery {
    fn on_message(&self, message: &Message) -> Result<(), HandlerError> {
        if !message.is_redelivered() {
            return Err(HandlerError::failed(format!("rejecting {}", message.body)));
        }
        self.accepted
            .lock()
            .unwrap()
            .push((message.body.clone(), message.is_redelivered()));
        Ok(())
    }
}

/// Coordinator whose commits always fail
#[derive(Default)]
struct FailingCommit {
    active: AtomicBool,
}

impl TransactionManager for FailingCommit {
    fn set_timeout(&self, _seconds: u32) -> BrokerResult<()> {
        Ok(())
    }

    fn begin(&self) -> BrokerResult<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn status(&self) -> BrokerResult<TransactionStatus> {
        Ok(if self.active.load(Ordering::SeqCst) {
            TransactionStatus::Active
        } else {
            TransactionStatus::NoTransaction
        })
    }

    fn commit(&self) -> BrokerResult<()> {
        Err(BrokerError::transaction("commit refused"))
    }

    fn rollback(&self) -> BrokerResult<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_every_message_reaches_the_handler() {
    let handler = Arc::new(RecordingHandler::default());
    let fixture = Fixture::new(fast_config("orders"), handler.clone());
    fixture.container.initialize().unwrap();

    for n in 0..20 {
        fixture.send(&format!("order-{n}"));
    }
    assert!(wait_until(|| handler.count() == 20));

    let unique: HashSet<_> = handler.bodies().into_iter().collect();
    assert_eq!(unique.len(), 20);
    assert_eq!(fixture.container.statistics().messages_received(), 20);
    assert_eq!(fixture.broker.queue_depth("orders"), 0);
}

#[test]
fn test_single_receiver_keeps_queue_order() {
    let handler = Arc::new(RecordingHandler::default());
    let fixture = Fixture::new(fast_config("orders"), handler.clone());
    for n in 0..5 {
        fixture.send(&n.to_string());
    }
    fixture.container.initialize().unwrap();

    assert!(wait_until(|| handler.count() == 5));
    assert_eq!(handler.bodies(), vec!["0", "1", "2", "3", "4"]);
}

#[test]
fn test_transacted_failure_is_redelivered() {
    let config = ContainerConfig {
        session_mode: SessionMode::Transacted,
        ..fast_config("orders")
    };
    let handler = Arc::new(FailFirstDelivery::default());
    let mut fixture = Fixture::new(config, handler.clone());
    fixture.send("retry-me");
    fixture.container.initialize().unwrap();

    assert!(wait_until(|| handler.accepted.lock().unwrap().len() == 1));
    assert_eq!(
        handler.accepted.lock().unwrap()[0],
        ("retry-me".to_string(), true)
    );

    let statistics = fixture.container.statistics();
    assert!(wait_until(|| statistics.committed_transactions() == 1));
    assert_eq!(statistics.rolled_back_transactions(), 1);
    assert_eq!(statistics.messages_received(), 1);

    let errors: Vec<_> = fixture
        .drain_events()
        .into_iter()
        .filter(|event| event.event_type == MonitorEventType::ReceiveError)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message.as_deref(), Some("Handler failed: rejecting retry-me"));
}

#[test]
fn test_client_acknowledge_failure_is_recovered() {
    let config = ContainerConfig {
        session_mode: SessionMode::ClientAcknowledge,
        cache_level: CacheLevel::None,
        ..fast_config("orders")
    };
    let handler = Arc::new(FailFirstDelivery::default());
    let fixture = Fixture::new(config, handler.clone());
    fixture.send("ack-me");
    fixture.container.initialize().unwrap();

    assert!(wait_until(|| handler.accepted.lock().unwrap().len() == 1));
    assert!(wait_until(|| fixture.broker.queue_depth("orders") == 0));
}

#[test]
fn test_cache_none_opens_connection_per_execution() {
    let config = ContainerConfig {
        cache_level: CacheLevel::None,
        max_messages_per_execution: 1,
        ..fast_config("orders")
    };
    let handler = Arc::new(RecordingHandler::default());
    let fixture = Fixture::new(config, handler.clone());
    fixture.container.initialize().unwrap();
    fixture.send("a");
    fixture.send("b");

    assert!(wait_until(|| handler.count() == 2));
    assert!(wait_until(|| fixture.broker.connections_opened() >= 3));
}

#[test]
fn test_panicking_handler_does_not_kill_receiver() {
    let handler = Arc::new(|message: &Message| -> Result<(), HandlerError> {
        if message.body == "explode" {
            panic!("handler exploded");
        }
        Ok(())
    });
    let mut fixture = Fixture::new(fast_config("orders"), handler);
    fixture.container.initialize().unwrap();

    fixture.send("explode");
    fixture.send("fine");
    let statistics = fixture.container.statistics();
    assert!(wait_until(|| statistics.messages_received() == 1));

    let errors: Vec<_> = fixture
        .drain_events()
        .into_iter()
        .filter(|event| event.event_type == MonitorEventType::ReceiveError)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message.as_deref(), Some("Handler panicked: handler exploded"));
    assert_eq!(fixture.container.receiver_count(), 1);
}

#[test]
fn test_message_arriving_while_stopped_stays_queued() {
    let handler = Arc::new(RecordingHandler::default());
    let config = ContainerConfig {
        max_messages_per_execution: 0,
        ..fast_config("orders")
    };
    let fixture = Fixture::new(config, handler.clone());
    fixture.container.initialize().unwrap();
    fixture.send("first");
    assert!(wait_until(|| handler.count() == 1));

    fixture.container.stop();
    fixture.send("second");
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(handler.count(), 1);

    fixture.container.start().unwrap();
    assert!(wait_until(|| handler.count() == 2));
    assert_eq!(handler.bodies(), vec!["first", "second"]);
}

#[test]
fn test_topic_subscription_receives_publications() {
    let handler = Arc::new(RecordingHandler::default());
    let fixture = Fixture::new(fast_config("topic://prices"), handler.clone());
    fixture.container.initialize().unwrap();
    assert!(wait_until(|| fixture.container.active_receiver_count() == 1));
    // Allow the consumer to subscribe before publishing
    std::thread::sleep(Duration::from_millis(50));

    fixture.send("42.0");
    assert!(wait_until(|| handler.count() == 1));
}

#[test]
fn test_failed_commit_is_not_counted_as_received() {
    let config = ContainerConfig {
        session_mode: SessionMode::Global,
        ..fast_config("payments")
    };
    let handler = Arc::new(RecordingHandler::default());
    let mut fixture = Fixture::with_transaction_manager(
        config,
        handler.clone(),
        Arc::new(FailingCommit::default()),
    );
    fixture.send("pay");
    fixture.container.initialize().unwrap();

    assert!(wait_until(|| handler.count() == 1));
    assert!(wait_until(|| fixture.saw(MonitorEventType::ListenerError)));
    let statistics = fixture.container.statistics();
    assert!(statistics.rolled_back_transactions() >= 1);
    assert_eq!(statistics.messages_received(), 0);
    assert_eq!(statistics.committed_transactions(), 0);
}
