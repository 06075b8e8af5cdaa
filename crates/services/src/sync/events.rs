use tokio::sync::broadcast;

use prep_core::model::{ProgressKey, ProgressScope, UserId};

const BUS_CAPACITY: usize = 64;

/// Progress changes other views recompute on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    LeafCompleted {
        user: UserId,
        key: ProgressKey,
        leaf: String,
    },
    SubjectCertified {
        scope: ProgressScope,
    },
    Reset {
        user: UserId,
        scope: ProgressScope,
    },
    /// A load settled; `remote_ok` is false when only local data was used.
    Loaded {
        user: UserId,
        scope: ProgressScope,
        remote_ok: bool,
    },
}

/// Broadcast channel shared by every controller of one process.
#[derive(Debug, Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers. Having none is fine.
    pub fn emit(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("progress event dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::{Course, Standard};

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe();
        let scope = ProgressScope::new(Course::Neet, Standard::Eleventh, "Biology");
        bus.emit(ProgressEvent::SubjectCertified {
            scope: scope.clone(),
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::SubjectCertified { scope }
        );
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let bus = ProgressBus::new();
        bus.emit(ProgressEvent::SubjectCertified {
            scope: ProgressScope::new(Course::Jee, Standard::Twelfth, "Maths"),
        });
    }
}
