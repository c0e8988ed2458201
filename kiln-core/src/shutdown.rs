//! Shutdown signalling and connection draining

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Counts connections that are being served.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection; `None` once admission stopped
    pub fn track(&self) -> Option<ConnectionGuard> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        self.active.fetch_add(1, Ordering::AcqRel);
        Some(ConnectionGuard {
            active: Arc::clone(&self.active),
        })
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    pub fn stop_admission(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_admitting(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Wait until no connection is active or `grace` elapsed.
    ///
    /// Returns whether everything drained in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        while self.active() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(open = self.active(), "grace period over with connections still open");
                return false;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
        info!("all connections drained");
        true
    }
}

/// Marks one connection as active until dropped
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicU64>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Asks a running server to stop. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger shutdown; calling it again does nothing
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolves once `rx` reports shutdown or its sender is gone
pub(crate) async fn signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guards_count_connections() {
        let tracker = ConnectionTracker::new();
        let a = tracker.track().unwrap();
        let b = tracker.track().unwrap();
        assert_eq!(tracker.active(), 2);
        drop(a);
        drop(b);
        assert!(tracker.drain(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_gives_up() {
        let tracker = ConnectionTracker::new();
        let _open = tracker.track().unwrap();
        assert!(!tracker.drain(Duration::from_secs(1)).await);
    }

    #[test]
    fn test_no_admission_after_stop() {
        let tracker = ConnectionTracker::new();
        tracker.stop_admission();
        assert!(tracker.track().is_none());
    }

    #[tokio::test]
    async fn test_handle_wakes_subscribers() {
        let handle = ShutdownHandle::new();
        let mut rx = handle.subscribe();
        handle.clone().shutdown();
        signalled(&mut rx).await;
        assert!(handle.is_shutdown());
    }
}
