//! Progress events published after each iteration of a run.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Non-blocking notification of run progress.
///
/// `iteration`/`total` count loop passes for the reactive strategy and
/// plan steps for plan-execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_goal: String,
    pub iteration: u32,
    pub total: u32,
    pub label: String,
}

impl ProgressEvent {
    /// Fraction of the budget consumed, in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.iteration as f32 / self.total as f32).min(1.0)
    }
}

/// Fan-out channel for [`ProgressEvent`]s.
///
/// The loop publishes after every iteration; consumers subscribe. Sends
/// to a channel with no subscribers are silently dropped, which is the
/// normal state for headless runs.
pub struct ProgressChannel {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(64)
    }
}
