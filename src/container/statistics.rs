//! Lock-free container counters

use crate::core::sync::lock_or_recover;
use crate::core::time::{SystemTimeProvider, TimeProvider};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Counters shared by every receiver of one container
pub struct ContainerStatistics {
    messages_received: AtomicU64,
    max_receivers_reached: AtomicUsize,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Default for ContainerStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerStatistics {
    pub fn new() -> Self {
        Self::with_time_provider(Arc::new(SystemTimeProvider))
    }

    pub fn with_time_provider(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            max_receivers_reached: AtomicUsize::new(0),
            committed: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
            started_at: Mutex::new(None),
            time_provider,
        }
    }

    /// Start the uptime clock; later calls keep the first start time
    pub fn mark_started(&self) {
        let mut started_at = lock_or_recover(&self.started_at);
        if started_at.is_none() {
            *started_at = Some(self.time_provider.now());
        }
    }

    pub fn increment_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the current receiver count; only the high-water mark is kept
    pub fn record_receivers(&self, count: usize) {
        self.max_receivers_reached.fetch_max(count, Ordering::Relaxed);
    }

    pub fn increment_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rolled_back(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn max_receivers_reached(&self) -> usize {
        self.max_receivers_reached.load(Ordering::Relaxed)
    }

    pub fn committed_transactions(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    pub fn rolled_back_transactions(&self) -> u64 {
        self.rolled_back.load(Ordering::Relaxed)
    }

    /// Time since the container was first initialized; zero before that
    pub fn uptime(&self) -> Duration {
        lock_or_recover(&self.started_at)
            .map(|started| self.time_provider.now().saturating_duration_since(started))
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            uptime_ms: u64::try_from(self.uptime().as_millis()).unwrap_or(u64::MAX),
            messages_received: self.messages_received(),
            max_receivers_reached: self.max_receivers_reached(),
            committed_transactions: self.committed_transactions(),
            rolled_back_transactions: self.rolled_back_transactions(),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatisticsSnapshot {
    pub uptime_ms: u64,
    pub messages_received: u64,
    pub max_receivers_reached: usize,
    pub committed_transactions: u64,
    pub rolled_back_transactions: u64,
}
