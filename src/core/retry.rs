//! Backoff policy for recovering from broker failures
//!
//! A fixed recovery interval is used for the first attempts; once the number
//! of consecutive attempts reaches the configured threshold the longer backoff
//! period takes over until an attempt succeeds and the counter is reset.

use std::time::Duration;

/// Recovery timing for repeated failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub recovery_interval: Duration,
    pub backoff_period: Duration,
    pub attempts_before_backoff: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            recovery_interval: Duration::from_millis(5000),
            backoff_period: Duration::from_millis(30000),
            attempts_before_backoff: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay to apply before the attempt numbered `attempt` (zero based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt >= self.attempts_before_backoff {
            self.backoff_period.max(self.recovery_interval)
        } else {
            self.recovery_interval
        }
    }
}

/// Retry a fallible operation until it succeeds or `keep_going` turns false
///
/// `pause` is handed the delay for every failed attempt and is responsible for
/// the actual waiting, which lets callers wake early on shutdown. `attempts`
/// is the caller's consecutive-attempt counter; it is advanced once per pause.
/// Returns `None` when the loop was abandoned before an attempt succeeded.
pub fn retry_blocking<T, E>(
    operation_name: &str,
    policy: &BackoffPolicy,
    attempts: &mut u32,
    mut keep_going: impl FnMut() -> bool,
    mut pause: impl FnMut(Duration),
    mut operation: impl FnMut() -> Result<T, E>,
) -> Option<T>
where
    E: std::fmt::Display,
{
    while keep_going() {
        match operation() {
            Ok(value) => return Some(value),
            Err(error) => {
                let delay = policy.delay_for(*attempts);
                log::debug!(
                    "Operation '{}' failed on attempt {}, retrying in {:?}: {}",
                    operation_name,
                    *attempts + 1,
                    delay,
                    error
                );
                *attempts = attempts.saturating_add(1);
                pause(delay);
            }
        }
    }
    None
}
