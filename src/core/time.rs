//! Time provider abstraction for testable uptime accounting

#[cfg(test)]
use std::sync::Mutex;
#[cfg(test)]
use std::time::Duration;
use std::time::{Instant, SystemTime};

/// Source of monotonic and wall-clock time
pub trait TimeProvider: Send + Sync {
    /// Current monotonic time (for measuring intervals)
    fn now(&self) -> Instant;

    /// Current system time (for event timestamps)
    fn system_time(&self) -> SystemTime;
}

/// Production time provider using the real clocks
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually advanced clock for deterministic tests
#[cfg(test)]
pub struct MockTimeProvider {
    current_instant: Mutex<Instant>,
    current_system_time: Mutex<SystemTime>,
}

#[cfg(test)]
impl MockTimeProvider {
    pub fn new() -> Self {
        Self {
            current_instant: Mutex::new(Instant::now()),
            current_system_time: Mutex::new(SystemTime::now()),
        }
    }

    /// Advance both clocks by the given duration
    pub fn advance_time(&self, duration: Duration) {
        *self.current_instant.lock().unwrap() += duration;
        *self.current_system_time.lock().unwrap() += duration;
    }
}

#[cfg(test)]
impl TimeProvider for MockTimeProvider {
    fn now(&self) -> Instant {
        *self.current_instant.lock().unwrap()
    }

    fn system_time(&self) -> SystemTime {
        *self.current_system_time.lock().unwrap()
    }
}
