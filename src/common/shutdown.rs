//! Cooperative cancellation. One `ShutdownHandle` lives in `main`; every
//! task holds a cheap `Shutdown` clone and checks it at suspension points.

use tokio::sync::watch;

#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is triggered. Safe to race in `select!`.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                // Sender dropped without triggering; treat as shutdown.
                return;
            }
        }
    }

    /// A token that can never fire, for components run without a runtime
    /// shutdown (one-shot CLI paths, tests).
    pub fn never() -> Shutdown {
        let (tx, rx) = watch::channel(false);
        // Leak the sender so the channel stays open.
        std::mem::forget(tx);
        Shutdown { rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_is_observed() {
        let (handle, shutdown) = shutdown_channel();
        assert!(!shutdown.is_cancelled());
        handle.trigger();
        assert!(shutdown.is_cancelled());
        // cancelled() resolves immediately once triggered
        tokio::time::timeout(Duration::from_secs(1), shutdown.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn never_token_stays_open() {
        let shutdown = Shutdown::never();
        assert!(!shutdown.is_cancelled());
        let timed = tokio::time::timeout(Duration::from_millis(10), shutdown.cancelled()).await;
        assert!(timed.is_err());
    }
}
