use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Cancel-and-restart timer owned by one controller.
///
/// Only the waiting period is cancelable. Once the delay elapses the action
/// runs on its own task, so a later `schedule` or `cancel` never aborts a
/// write that is already in flight.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    pending: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay`, replacing any action still waiting.
    pub fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action);
        }));
    }

    /// Drop the waiting action, if any. Returns whether one was waiting.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
