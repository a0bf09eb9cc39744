//! Untyped part of a task: identity, tags, state, ancestry, timestamps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::handle::TaskRef;
use crate::domain::{ContextError, TagSet, TaskId, TaskState, TaskTag};

#[derive(Debug, Clone, Copy, Default)]
struct Timestamps {
    submitted_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

/// State shared by every task regardless of its result type.
///
/// Design:
/// - State transitions are compare-and-set on a `watch` channel, so a task
///   can be submitted only once and waiters are woken on completion.
/// - The parent link is set at most once.
#[derive(Debug)]
pub struct TaskCore {
    id: TaskId,
    display_name: String,
    description: String,
    tags: Mutex<TagSet>,
    state: watch::Sender<TaskState>,
    parent: OnceLock<TaskId>,
    children: Mutex<Vec<TaskRef>>,
    cancel_requested: Arc<AtomicBool>,
    times: Mutex<Timestamps>,
}

impl TaskCore {
    pub(crate) fn new(display_name: String, description: String, tags: TagSet) -> Self {
        let (state, _) = watch::channel(TaskState::Unsubmitted);
        Self {
            id: TaskId::generate(),
            display_name,
            description,
            tags: Mutex::new(tags),
            state,
            parent: OnceLock::new(),
            children: Mutex::new(Vec::new()),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            times: Mutex::new(Timestamps::default()),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tags(&self) -> TagSet {
        self.tags.lock().clone()
    }

    pub fn has_tag(&self, tag: &TaskTag) -> bool {
        self.tags.lock().contains(tag)
    }

    pub fn add_tags(&self, tags: &TagSet) {
        self.tags.lock().extend(tags);
    }

    pub fn add_tag(&self, tag: TaskTag) {
        self.tags.lock().insert(tag);
    }

    pub fn remove_tags_where(&self, pred: impl Fn(&TaskTag) -> bool) -> Vec<TaskTag> {
        self.tags.lock().remove_where(pred)
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    pub fn is_queued_or_submitted(&self) -> bool {
        self.state().is_queued_or_submitted()
    }

    pub fn is_done(&self) -> bool {
        self.state().is_done()
    }

    fn transition(&self, allowed: impl Fn(TaskState) -> bool, to: TaskState) -> bool {
        self.state.send_if_modified(|state| {
            if allowed(*state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Unsubmitted -> Queued. Returns `false` if the task was already submitted.
    pub fn mark_submitted(&self) -> bool {
        self.transition(|s| s == TaskState::Unsubmitted, TaskState::Queued)
    }

    /// Queued -> Running.
    pub fn mark_running(&self) -> bool {
        self.transition(|s| s == TaskState::Queued, TaskState::Running)
    }

    /// Any non-terminal state -> Done / Failed.
    pub(crate) fn mark_finished(&self, succeeded: bool) -> bool {
        let to = if succeeded {
            TaskState::Done
        } else {
            TaskState::Failed
        };
        self.transition(|s| !s.is_done(), to)
    }

    /// Request cancellation.
    ///
    /// A task that has not finished moves to `Cancelled` immediately; work
    /// already running observes the request through `ambient::checkpoint`.
    /// Returns `false` if the task had already finished.
    pub fn cancel(&self) -> bool {
        let changed = self.transition(|s| !s.is_done(), TaskState::Cancelled);
        if changed {
            self.cancel_requested.store(true, Ordering::SeqCst);
        }
        changed
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_requested)
    }

    /// Wait until the task reaches a terminal state.
    pub async fn wait_done(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives as long as `self`, so this cannot observe a closed channel
        let _ = rx.wait_for(|s| s.is_done()).await;
    }

    pub fn parent(&self) -> Option<TaskId> {
        self.parent.get().copied()
    }

    fn link_parent(&self, parent: TaskId) -> Result<(), ContextError> {
        let existing = *self.parent.get_or_init(|| parent);
        if existing == parent {
            Ok(())
        } else {
            Err(ContextError::AlreadyParented {
                child: self.id,
                parent: existing,
            })
        }
    }

    /// Record `child` as a child of this task.
    ///
    /// A task has at most one parent; adding the same child twice is a no-op.
    pub fn add_child(&self, child: TaskRef) -> Result<(), ContextError> {
        let mut children = self.children.lock();
        child.core().link_parent(self.id)?;
        if !children.iter().any(|c| c.core().id() == child.core().id()) {
            children.push(child);
        }
        Ok(())
    }

    pub fn children(&self) -> Vec<TaskRef> {
        self.children.lock().clone()
    }

    pub fn has_child(&self, id: TaskId) -> bool {
        self.children.lock().iter().any(|c| c.core().id() == id)
    }

    pub(crate) fn record_submitted(&self, at: DateTime<Utc>) {
        self.times.lock().submitted_at.get_or_insert(at);
    }

    pub(crate) fn record_started(&self, at: DateTime<Utc>) {
        self.times.lock().started_at.get_or_insert(at);
    }

    pub(crate) fn record_ended(&self, at: DateTime<Utc>) {
        self.times.lock().ended_at.get_or_insert(at);
    }

    pub fn summary(&self) -> TaskSummary {
        let times = *self.times.lock();
        TaskSummary {
            id: self.id.to_string(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            state: self.state(),
            tags: self.tags.lock().to_sorted_strings(),
            parent: self.parent().map(|p| p.to_string()),
            children: self
                .children
                .lock()
                .iter()
                .map(|c| c.core().id().to_string())
                .collect(),
            submitted_at: times.submitted_at,
            started_at: times.started_at,
            ended_at: times.ended_at,
        }
    }
}

/// Serialisable snapshot of a task, as shown to API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub state: TaskState,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}
