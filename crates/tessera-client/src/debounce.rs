//! Cancellable single-slot timer.
//!
//! At most one action is pending per [`Debouncer`]. Scheduling a new action
//! aborts the previous timer outright, so only the last one scheduled within
//! the quiet period ever runs. Once a timer fires its action runs on its own
//! task and is no longer affected by later scheduling.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Runs the most recently scheduled action after a quiet period.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Creates a debouncer with a fixed quiet period.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// The quiet period.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `action` to run after the quiet period, cancelling any
    /// pending timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action);
        });

        if let Some(previous) = self.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Cancels the pending timer. Returns true if one was still waiting.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(timer) => {
                let waiting = !timer.is_finished();
                timer.abort();
                waiting
            }
            None => false,
        }
    }

    /// True while a timer is waiting to fire.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(timer) = self.lock().take() {
            timer.abort();
        }
    }
}
