//! Status - タスクツリーと件数の表示用ビュー

use serde::{Deserialize, Serialize};

use crate::domain::TaskState;
use crate::task::{TaskRef, TaskSummary};

/// A task with its descendants, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    #[serde(flatten)]
    pub task: TaskSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<TaskNode>,
}

impl TaskNode {
    pub fn from_task(task: &TaskRef) -> Self {
        Self {
            task: task.summary(),
            subtasks: task
                .core()
                .children()
                .iter()
                .map(TaskNode::from_task)
                .collect(),
        }
    }

    /// Number of tasks in this tree.
    pub fn size(&self) -> usize {
        1 + self.subtasks.iter().map(TaskNode::size).sum::<usize>()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskCounts {
    /// Tally task states. Unsubmitted tasks are not counted.
    pub fn from_states(states: impl IntoIterator<Item = TaskState>) -> Self {
        let mut counts = Self::default();
        for state in states {
            match state {
                TaskState::Queued => counts.queued += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Done => counts.done += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Cancelled => counts.cancelled += 1,
                TaskState::Unsubmitted => {}
            }
        }
        counts
    }
}
