//! Shutdown broadcast and exit tracking for engine drivers
//!
//! Every driver task holds an [`EngineContext`]. Triggering the controller asks
//! all drivers to kill their engine; [`ShutdownController::wait`] resolves once
//! every context has been dropped.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Handle held by one engine driver for its whole lifetime.
#[derive(Debug)]
pub struct EngineContext {
    id: usize,
    shutdown: watch::Receiver<bool>,
    _alive: mpsc::Sender<()>,
}

impl EngineContext {
    #[inline]
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves when shutdown is triggered or the controller is gone.
    pub async fn shutdown_requested(&mut self) {
        // An error means the controller was dropped, which is also a shutdown.
        let _ = self.shutdown.wait_for(|stop| *stop).await;
    }
}

#[derive(Debug)]
pub struct ShutdownController {
    shutdown: watch::Sender<bool>,
    alive_tx: Mutex<Option<mpsc::Sender<()>>>,
    alive_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        let (alive_tx, alive_rx) = mpsc::channel(1);
        Self {
            shutdown,
            alive_tx: Mutex::new(Some(alive_tx)),
            alive_rx: tokio::sync::Mutex::new(alive_rx),
        }
    }

    /// Context for a new driver; `None` once shutdown has been triggered.
    #[must_use]
    pub fn context(&self, id: usize) -> Option<EngineContext> {
        let alive = self.alive_tx.lock().as_ref()?.clone();
        Some(EngineContext {
            id,
            shutdown: self.shutdown.subscribe(),
            _alive: alive,
        })
    }

    /// Ask every driver to terminate its engine. Idempotent.
    pub fn trigger(&self) {
        self.alive_tx.lock().take();
        self.shutdown.send_replace(true);
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Wait up to `limit` for all drivers to exit. Returns `true` if they did.
    ///
    /// Only meaningful after [`trigger`](Self::trigger); before that the
    /// controller's own sender keeps the channel open and this times out.
    pub async fn wait(&self, limit: Duration) -> bool {
        let mut rx = self.alive_rx.lock().await;
        tokio::time::timeout(limit, rx.recv()).await.is_ok()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_resolves_after_contexts_drop() {
        let controller = ShutdownController::new();
        let mut ctx = controller.context(0).unwrap();
        assert!(!ctx.is_shutdown());

        let driver = tokio::spawn(async move {
            ctx.shutdown_requested().await;
            ctx.id()
        });

        controller.trigger();
        assert!(controller.context(1).is_none());
        assert_eq!(driver.await.unwrap(), 0);
        assert!(controller.wait(Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn wait_times_out_while_a_driver_lingers() {
        let controller = ShutdownController::new();
        let _stuck = controller.context(0).unwrap();
        controller.trigger();
        assert!(!controller.wait(Duration::from_millis(20)).await);
    }
}
