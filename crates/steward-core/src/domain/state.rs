//! State - タスクの状態

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// State transitions:
/// - Unsubmitted -> Queued -> Running -> Done | Failed
/// - Unsubmitted | Queued | Running -> Cancelled
///
/// `Queued` covers both "accepted by the registry, not yet running" and
/// "submitted for inline execution"; routing treats them the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Unsubmitted,
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Anything past `Unsubmitted`.
    pub fn is_queued_or_submitted(self) -> bool {
        !matches!(self, TaskState::Unsubmitted)
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_done(self) -> bool {
        matches!(
            self,
            TaskState::Done | TaskState::Failed | TaskState::Cancelled
        )
    }
}
