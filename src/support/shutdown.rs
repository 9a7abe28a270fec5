//! Graceful shutdown handling
//!
//! Coordinates shutdown across every station worker, connection pump, and
//! control-plane listener task in the fleet. Unlike a single-connection
//! server, this process can be running dozens of stations at once, so the
//! coordinator takes the active hash-ids at shutdown time and reports them
//! rather than just a bare "shutting down" line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shutdown signal that can be cloned and shared across tasks.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            info!("shutdown signal triggered");
            let _ = self.sender.send(());
        }
    }

    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        let _ = rx.recv().await;
    }

    pub fn notified(&self) -> ShutdownNotified {
        ShutdownNotified {
            receiver: self.subscribe(),
            triggered: self.triggered.clone(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A future that resolves when shutdown is triggered.
pub struct ShutdownNotified {
    receiver: broadcast::Receiver<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownNotified {
    pub async fn wait(mut self) {
        if self.triggered.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.receiver.recv().await;
    }
}

/// Listens for OS shutdown signals (SIGTERM, SIGINT) and triggers `shutdown`.
pub async fn listen_for_shutdown_signals(shutdown: ShutdownSignal) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("received SIGINT (Ctrl+C)");
            }
        }

        shutdown.trigger();
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C");
        shutdown.trigger();
    }
}

/// Graceful shutdown coordinator: owns the signal, drives the OS-signal
/// listener, and bounds how long cleanup (`WorkerPool::stop_all` plus any
/// in-flight requests draining) is allowed to take.
pub struct ShutdownCoordinator {
    signal: ShutdownSignal,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            signal: ShutdownSignal::new(),
            timeout_secs,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    pub fn start_signal_listener(&self) {
        let signal = self.signal.clone();
        tokio::spawn(async move {
            listen_for_shutdown_signals(signal).await;
        });
    }

    /// Waits for the shutdown signal, then runs `cleanup` under the
    /// timeout. `active_stations` is the hash-id of every station still
    /// running at the moment shutdown began, logged so an operator can
    /// tell which stations a timed-out cleanup left mid-teardown.
    pub async fn shutdown_with_cleanup<F, Fut>(&self, active_stations: &[String], cleanup: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        self.signal.wait().await;
        info!(
            timeout_secs = self.timeout_secs,
            station_count = active_stations.len(),
            "starting graceful shutdown of station fleet"
        );

        match tokio::time::timeout(tokio::time::Duration::from_secs(self.timeout_secs), cleanup()).await {
            Ok(()) => {
                info!(station_count = active_stations.len(), "graceful shutdown completed");
                true
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout_secs,
                    stations = ?active_stations,
                    "graceful shutdown timed out with stations still tearing down"
                );
                false
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_is_idempotent_and_wakes_waiters() {
        let signal = ShutdownSignal::new();
        let notified = signal.notified();
        signal.trigger();
        signal.trigger();
        notified.wait().await;
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn cleanup_timeout_reports_false() {
        let coordinator = ShutdownCoordinator::new(0);
        coordinator.signal().trigger();
        let active = vec!["cp-1".to_string(), "cp-2".to_string()];
        let completed = coordinator
            .shutdown_with_cleanup(&active, || async { tokio::time::sleep(tokio::time::Duration::from_secs(5)).await })
            .await;
        assert!(!completed);
    }
}
