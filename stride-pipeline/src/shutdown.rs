//! Cooperative shutdown shared by the listeners and background loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::Duration;

/// Broadcast switch flipped by ctrl-c or an explicit trigger.
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    /// Create a signal wired to ctrl-c. Must be called inside a runtime.
    #[must_use]
    pub fn new() -> Self {
        let signal = Self::unwired();
        let flag = signal.flag.clone();
        let notify = signal.notify.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::SeqCst);
                notify.notify_waiters();
            }
        });
        signal
    }

    /// Create a signal without the ctrl-c watcher; tests trigger it directly.
    #[must_use]
    pub fn unwired() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown is requested.
    pub async fn wait(&self) {
        while !self.triggered() {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking the flag so a trigger landing in
            // between cannot be missed.
            notified.as_mut().enable();
            if self.triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for the full duration unless shutdown interrupts it.
    /// Returns `true` when the sleep completed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => !self.triggered(),
            () = self.wait() => false,
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_waiters() {
        let signal = ShutdownSignal::unwired();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        signal.trigger();
        handle.await.unwrap();
        assert!(signal.triggered());
    }

    #[tokio::test]
    async fn sleep_is_cut_short_by_shutdown() {
        let signal = ShutdownSignal::unwired();
        signal.trigger();
        assert!(!signal.sleep(Duration::from_secs(30)).await);
    }
}
