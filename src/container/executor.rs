//! Task executors for receiver executions
//!
//! Receivers never spawn threads themselves. Each bounded execution is handed
//! to a [`TaskExecutor`], which may refuse it. A refusal hands the task back so
//! the container can park it instead of losing it.
//!
//! Receiver executions block (on broker receives and on the pause wait), so
//! an executor must run them off the submitting thread. A receiver resubmits
//! itself before its current task returns; that resubmission goes through
//! [`TaskExecutor::submit_continuation`], which lets [`BlockingTaskExecutor`]
//! hand the finishing task's permit to its successor. A pool therefore never
//! needs more permits than the sum of `max-receivers` it serves.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One scheduled unit of work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Why a task was not accepted; the task is handed back either way
pub enum ExecutorError {
    /// No capacity right now; resubmitting later may succeed
    Saturated { task: Task },
    /// The executor no longer accepts work
    Shutdown { task: Task },
}

impl ExecutorError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, ExecutorError::Shutdown { .. })
    }

    pub fn into_task(self) -> Task {
        match self {
            ExecutorError::Saturated { task } | ExecutorError::Shutdown { task } => task,
        }
    }
}

impl fmt::Debug for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::Saturated { .. } => f.write_str("Saturated"),
            ExecutorError::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::Saturated { .. } => f.write_str("Executor is saturated"),
            ExecutorError::Shutdown { .. } => f.write_str("Executor has been shut down"),
        }
    }
}

impl std::error::Error for ExecutorError {}

/// Runs submitted tasks, possibly refusing them
pub trait TaskExecutor: Send + Sync {
    fn submit(&self, task: Task) -> Result<(), ExecutorError>;

    /// Submit the successor of the task running on the calling thread
    ///
    /// The caller is about to return. Executors that bound concurrency may
    /// pass the caller's slot on instead of taking a new one.
    fn submit_continuation(&self, task: Task) -> Result<(), ExecutorError> {
        self.submit(task)
    }
}

/// Runs tasks on a tokio runtime's blocking pool
///
/// At most `max_concurrent_tasks` tasks run at once; further submissions are
/// refused with [`ExecutorError::Saturated`] instead of queueing.
pub struct BlockingTaskExecutor {
    handle: Handle,
    permits: Arc<Semaphore>,
    max_concurrent_tasks: usize,
    closed: AtomicBool,
    running: Arc<AtomicUsize>,
}

thread_local! {
    /// Permit of the task running on this blocking thread, keyed by executor
    static CURRENT_PERMIT: RefCell<Option<(usize, RunningTask)>> = const { RefCell::new(None) };
}

/// Clears the thread's permit slot when a task ends, even by panic
struct PermitScope;

impl Drop for PermitScope {
    fn drop(&mut self) {
        let leftover = CURRENT_PERMIT.try_with(|slot| slot.borrow_mut().take());
        drop(leftover);
    }
}

/// Releases the permit and the running count even if the task panics
struct RunningTask {
    running: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for RunningTask {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BlockingTaskExecutor {
    pub fn new(handle: Handle, max_concurrent_tasks: usize) -> Self {
        let max_concurrent_tasks = max_concurrent_tasks.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(max_concurrent_tasks)),
            max_concurrent_tasks,
            closed: AtomicBool::new(false),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build on the runtime the caller is running in
    ///
    /// Panics outside a tokio runtime, like [`Handle::current`].
    pub fn current(max_concurrent_tasks: usize) -> Self {
        Self::new(Handle::current(), max_concurrent_tasks)
    }

    /// Refuse all further submissions; running tasks are unaffected
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::debug!("Task executor closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.max_concurrent_tasks
    }

    /// Tasks currently executing
    pub fn running_tasks(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.permits) as usize
    }

    fn spawn(&self, guard: RunningTask, task: Task) {
        let key = self.key();
        self.handle.spawn_blocking(move || {
            let _scope = PermitScope;
            CURRENT_PERMIT.with(|slot| *slot.borrow_mut() = Some((key, guard)));
            task();
        });
    }

    /// Take the permit of this executor's task running on the calling thread
    fn inherit_permit(&self) -> Option<RunningTask> {
        let key = self.key();
        CURRENT_PERMIT
            .try_with(|slot| {
                let mut slot = slot.borrow_mut();
                match slot.take() {
                    Some((owner, guard)) if owner == key => Some(guard),
                    other => {
                        *slot = other;
                        None
                    }
                }
            })
            .ok()
            .flatten()
    }
}

impl TaskExecutor for BlockingTaskExecutor {
    fn submit(&self, task: Task) -> Result<(), ExecutorError> {
        if self.is_closed() {
            return Err(ExecutorError::Shutdown { task });
        }
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(ExecutorError::Saturated { task }),
        };

        self.running.fetch_add(1, Ordering::SeqCst);
        let guard = RunningTask {
            running: Arc::clone(&self.running),
            _permit: permit,
        };
        self.spawn(guard, task);
        Ok(())
    }

    fn submit_continuation(&self, task: Task) -> Result<(), ExecutorError> {
        if self.is_closed() {
            return Err(ExecutorError::Shutdown { task });
        }
        match self.inherit_permit() {
            Some(guard) => {
                self.spawn(guard, task);
                Ok(())
            }
            None => self.submit(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_runs_task_off_the_submitting_thread() {
        let runtime = runtime();
        let executor = BlockingTaskExecutor::new(runtime.handle().clone(), 2);
        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();

        executor
            .submit(Box::new(move || {
                tx.send(std::thread::current().id()).unwrap();
            }))
            .unwrap();

        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn test_saturated_when_no_permit_is_free() {
        let runtime = runtime();
        let executor = BlockingTaskExecutor::new(runtime.handle().clone(), 1);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();

        executor
            .submit(Box::new(move || {
                started_tx.send(()).unwrap();
                let _ = release_rx.recv();
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(executor.running_tasks(), 1);

        let rejected = executor.submit(Box::new(|| {})).unwrap_err();
        assert!(!rejected.is_permanent());

        release_tx.send(()).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while executor.running_tasks() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        // The returned task is still runnable once capacity frees up
        let mut accepted = false;
        let mut task = rejected.into_task();
        while std::time::Instant::now() < deadline {
            match executor.submit(task) {
                Ok(()) => {
                    accepted = true;
                    break;
                }
                Err(error) => {
                    task = error.into_task();
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
        assert!(accepted);
    }

    #[test]
    fn test_shutdown_rejection_is_permanent() {
        let runtime = runtime();
        let executor = BlockingTaskExecutor::new(runtime.handle().clone(), 4);
        executor.close();
        assert!(executor.is_closed());

        let error = executor.submit(Box::new(|| {})).unwrap_err();
        assert!(error.is_permanent());
        assert_eq!(error.to_string(), "Executor has been shut down");
    }

    #[test]
    fn test_continuation_inherits_the_running_permit() {
        let runtime = runtime();
        let executor = Arc::new(BlockingTaskExecutor::new(runtime.handle().clone(), 1));
        let (tx, rx) = mpsc::channel();

        let inner = Arc::clone(&executor);
        executor
            .submit(Box::new(move || {
                let plain = inner.submit(Box::new(|| {}));
                let done = tx.clone();
                let continued = inner.submit_continuation(Box::new(move || {
                    done.send("continued").unwrap();
                }));
                tx.send(if plain.is_err() { "plain refused" } else { "plain accepted" })
                    .unwrap();
                tx.send(if continued.is_ok() { "handed off" } else { "refused" })
                    .unwrap();
            }))
            .unwrap();

        let mut seen: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["continued", "handed off", "plain refused"]);

        // The handed-off permit is released once the continuation finishes
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut accepted = false;
        while !accepted && std::time::Instant::now() < deadline {
            accepted = executor.submit(Box::new(|| {})).is_ok();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(accepted);
    }

    #[test]
    fn test_continuation_outside_a_task_takes_a_fresh_permit() {
        let runtime = runtime();
        let executor = BlockingTaskExecutor::new(runtime.handle().clone(), 1);
        let (tx, rx) = mpsc::channel();

        executor
            .submit_continuation(Box::new(move || tx.send(()).unwrap()))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        executor.close();
        let error = executor.submit_continuation(Box::new(|| {})).unwrap_err();
        assert!(error.is_permanent());
    }

    #[test]
    fn test_capacity_is_at_least_one() {
        let runtime = runtime();
        assert_eq!(BlockingTaskExecutor::new(runtime.handle().clone(), 0).capacity(), 1);
    }
}
