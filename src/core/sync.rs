//! Synchronisation helpers for mutex poisoning
//!
//! Two policies are used across the crate. Operations that already return a
//! `Result` convert a poisoned lock into a domain error with
//! [`handle_mutex_poison`].
//! Bookkeeping paths that must always make progress (receiver run loops,
//! shutdown drains) take the guard back out of the poison error with
//! [`lock_or_recover`] and [`wait_or_recover`], since a panicking message
//! handler must never wedge the whole receiver pool.

use std::sync::{
    Condvar, LockResult, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use std::time::Duration;

/// Convert a poisoned mutex lock into an application error
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use brokerpool::core::sync::handle_mutex_poison;
/// use brokerpool::container::api::ContainerError;
///
/// let mutex = Mutex::new(42);
/// let guard = handle_mutex_poison(mutex.lock(), |message| ContainerError::Internal { message })
///     .unwrap();
/// assert_eq!(*guard, 42);
/// ```
pub fn handle_mutex_poison<T, E>(
    result: LockResult<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<T, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (mutex poisoned). A panic occurred while holding a lock. PoisonError: {:?}",
            poison_err
        ))
    })
}

/// Lock a mutex, recovering the guard if a previous holder panicked
pub fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("Recovered a poisoned lock; continuing with the last written state");
        poisoned.into_inner()
    })
}

/// Read-lock an RwLock, recovering the guard if a writer panicked
pub fn read_or_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-lock an RwLock, recovering the guard if a previous holder panicked
pub fn write_or_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        log::warn!("Recovered a poisoned lock; continuing with the last written state");
        poisoned.into_inner()
    })
}

/// Wait on a condition variable, recovering the guard if the lock was poisoned
pub fn wait_or_recover<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

/// Wait on a condition variable for at most `timeout`
///
/// Spurious wakeups are possible; callers re-check their own condition.
pub fn wait_timeout_or_recover<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
) -> MutexGuard<'a, T> {
    let (guard, _) = condvar
        .wait_timeout(guard, timeout)
        .unwrap_or_else(PoisonError::into_inner);
    guard
}

/// Wait on a condition variable for at most `timeout` while `condition` holds
///
/// Returns the guard and whether the wait ended because the timeout elapsed.
pub fn wait_timeout_while_or_recover<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
    condition: impl FnMut(&mut T) -> bool,
) -> (MutexGuard<'a, T>, bool) {
    let (guard, result) = condvar
        .wait_timeout_while(guard, timeout, condition)
        .unwrap_or_else(PoisonError::into_inner);
    (guard, result.timed_out())
}
