//! Background task registry
//!
//! Owns the runtime's long-lived tasks (the scheduler tick loop and the
//! monitoring drain) and stops them together at shutdown.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for JoinHandle storage because:
//! 1. Operations are O(1) push or O(n) drain (shutdown only)
//! 2. Lock is never held across `.await` points
//! 3. No I/O or async work inside lock scope

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Tracks spawned tasks and stops them together
#[derive(Debug)]
pub struct RuntimeTaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl RuntimeTaskRegistry {
    /// Empty registry
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a task that is dropped as soon as shutdown is signalled
    pub fn spawn_cancellable<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = fut => {}
            }
        });
        self.track(handle);
    }

    /// Call `f` every `interval` until it returns `false` or shutdown
    ///
    /// Missed ticks are skipped rather than bursted.
    pub fn spawn_interval_until<F, Fut>(&self, interval: Duration, mut f: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if !f().await {
                            break;
                        }
                    }
                }
            }
        });
        self.track(handle);
    }

    /// Token cancelled at shutdown, for work that checks cooperatively
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Tasks still tracked
    pub fn len(&self) -> usize {
        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.len()
    }

    /// Returns true if no task is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal shutdown and abort every tracked task
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.token.cancel();
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }
}

impl Default for RuntimeTaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RuntimeTaskRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_interval_stops_when_closure_returns_false() {
        let registry = RuntimeTaskRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        registry.spawn_interval_until(Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move { counter.fetch_add(1, Ordering::SeqCst) + 1 < 3 }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_intervals_and_cancels_token() {
        let registry = RuntimeTaskRegistry::new();
        let token = registry.cancellation_token();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        registry.spawn_interval_until(Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }
        });
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        registry.shutdown();
        let seen = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), seen);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_drops_cancellable_tasks() {
        let registry = RuntimeTaskRegistry::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);
        let (held_tx, held_rx) = tokio::sync::oneshot::channel::<()>();

        registry.spawn_cancellable(async move {
            let _held = held_tx;
            while rx.recv().await.is_some() {}
        });
        tx.send(()).await.unwrap();
        assert_eq!(registry.len(), 1);

        registry.shutdown();

        // The channel is still open, so only shutdown can have ended the task
        assert!(held_rx.await.is_err());
        assert!(registry.is_empty());
    }
}
