//! Periodic background refresh of the kind catalog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::KindResolver;

/// Refreshes a [`KindResolver`] on a fixed interval until stopped.
pub struct CatalogRefresher {
    resolver: Arc<KindResolver>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl CatalogRefresher {
    pub fn new(resolver: Arc<KindResolver>, interval: Duration) -> Self {
        Self {
            resolver,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Starts the refresh loop on the current runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let resolver = Arc::clone(&self.resolver);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let interval = self.interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.tick().await; // skip immediate first tick

            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = interval_timer.tick() => {},
                    _ = wake.notified() => {},
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                if resolver.refresh().await {
                    log::debug!("Periodic kind catalog refresh done");
                }
            }

            log::debug!("Kind catalog refresher stopped");
        })
    }

    /// Signals the refresher to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}
