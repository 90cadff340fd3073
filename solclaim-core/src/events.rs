use tokio::sync::mpsc::UnboundedSender;

use crate::types::ClosePhase;

/// Progress notifications emitted while a close run executes.
///
/// Ordering is guaranteed: `BatchStarted` is emitted before its batch is
/// processed, `BatchCompleted` or `BatchFailed` after, and batches are
/// processed strictly in order.
#[derive(Debug, Clone)]
pub enum ReclaimEvent {
    PhaseChanged(ClosePhase),
    BatchStarted {
        batch_index: usize,
        total_batches: usize,
    },
    BatchCompleted {
        batch_index: usize,
        total_batches: usize,
        signature: String,
    },
    BatchFailed {
        batch_index: usize,
        error: String,
    },
}

/// Sends [ReclaimEvent]s to an optional subscriber. A missing or dropped
/// receiver turns every send into a no-op so the engine never depends on
/// someone listening.
#[derive(Debug, Clone, Default)]
pub struct EventSender(Option<UnboundedSender<ReclaimEvent>>);

impl EventSender {
    pub fn new(sender: Option<UnboundedSender<ReclaimEvent>>) -> Self {
        Self(sender)
    }

    pub fn send(&self, event: ReclaimEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event);
        }
    }

    pub fn phase(&self, phase: ClosePhase) {
        self.send(ReclaimEvent::PhaseChanged(phase));
    }
}
