use tokio::{sync::broadcast, task::JoinHandle};
use tracing::warn;

/// A subscription bound to the owning view's lifetime: dropping it aborts the
/// forwarding task, releasing the listener on every exit path.
pub struct ScopedSubscription {
    task: JoinHandle<()>,
}

impl ScopedSubscription {
    /// Forwards every event from `updates` into `on_event` until the channel
    /// closes or the subscription is dropped.
    pub fn spawn<T, F>(mut updates: broadcast::Receiver<T>, mut on_event: F) -> Self
    where
        T: Clone + Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(event) => on_event(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscription lagged; continuing");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }

    /// Wraps an already-spawned forwarding task.
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task }
    }
}

impl Drop for ScopedSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
