use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};

/// Handle to one armed debounce timer.
#[derive(Debug)]
pub struct DebounceHandle {
    abort: AbortHandle,
}

impl DebounceHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Cancellable single-slot timer: arming it again cancels the pending one,
/// so only the last value of a burst ever settles.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called from within a tokio runtime.
    pub fn start<T, F>(&self, value: T, delay: Duration, on_settle: F) -> DebounceHandle
    where
        T: Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(prev) = pending.take() {
            prev.abort();
        }

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_settle(value);
        });
        let handle = DebounceHandle {
            abort: task.abort_handle(),
        };
        *pending = Some(task);
        handle
    }

    pub fn cancel(&self) {
        if let Some(prev) = self.pending.lock().take() {
            prev.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(prev) = self.pending.get_mut().take() {
            prev.abort();
        }
    }
}
