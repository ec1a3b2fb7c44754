//! Cancellation shared by every remote call and subprocess.
//!
//! A single [`ShutdownCoordinator`] is created per command. `main` wires
//! Ctrl+C to it; everything that blocks on the network, a child process or
//! the build-follow timer races against it through [`ShutdownCoordinator::run`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{Error, Result};

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Coordinates cancellation across the engine.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    is_shutdown: AtomicBool,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    #[must_use]
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown. Wakes all current waiters exactly once.
    pub fn request_shutdown(&self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested. Returns immediately if already set.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent request is not lost.
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    /// Run `fut` unless shutdown is requested first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if shutdown wins the race, otherwise
    /// whatever `fut` returns.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_shutdown_requested() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.wait_for_shutdown() => Err(Error::Cancelled),
            result = fut => result,
        }
    }

    /// Sleep for `duration`, returning early with [`Error::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if shutdown is requested while sleeping.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
