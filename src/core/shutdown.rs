//! Shutdown signal coordination
//!
//! Turns process signals into a single broadcast that the binary maps onto
//! the container registry lifecycle. The first signal requests a graceful
//! shutdown (receivers drain); a second signal exits immediately.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Exit status used when a second signal forces termination
const FORCED_EXIT_CODE: i32 = 130;

/// Coordinates graceful shutdown across the application
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
    signal_count: Arc<AtomicUsize>,
}

impl ShutdownCoordinator {
    /// Create a new coordinator together with a first subscriber
    pub fn new() -> (Self, broadcast::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(8);
        let coordinator = Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            signal_count: Arc::new(AtomicUsize::new(0)),
        };
        (coordinator, shutdown_rx)
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Request shutdown and wake every subscriber
    pub fn trigger_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Record one received signal; returns true when it is a repeat signal
    fn record_signal(&self) -> bool {
        let previous = self.signal_count.fetch_add(1, Ordering::AcqRel);
        self.trigger_shutdown();
        previous >= 1
    }

    /// Install process signal handlers on the current tokio runtime
    ///
    /// Must be called from within a runtime context.
    pub fn install_signal_handlers(&self) {
        #[cfg(unix)]
        {
            // Restore default SIGPIPE so piping output into `head` ends quietly.
            unsafe {
                libc::signal(libc::SIGPIPE, libc::SIG_DFL);
            }

            use tokio::signal::unix::{signal, SignalKind};
            let kinds = [
                SignalKind::interrupt(),
                SignalKind::terminate(),
                SignalKind::hangup(),
                SignalKind::quit(),
            ];

            for kind in kinds {
                let coordinator = self.clone();
                tokio::spawn(async move {
                    let Ok(mut stream) = signal(kind) else {
                        log::warn!("Could not install handler for signal {:?}", kind);
                        return;
                    };
                    while stream.recv().await.is_some() {
                        if coordinator.record_signal() {
                            log::warn!("Second shutdown signal received; exiting immediately");
                            std::process::exit(FORCED_EXIT_CODE);
                        }
                        log::info!("Shutdown signal received; draining receivers");
                    }
                });
            }
        }

        #[cfg(not(unix))]
        {
            let coordinator = self.clone();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if coordinator.record_signal() {
                        std::process::exit(FORCED_EXIT_CODE);
                    }
                }
            });
        }
    }
}
