use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::core::{TaskCore, TaskSummary};
use super::job::Job;
use crate::domain::{ContextError, JobError, TagSet, TaskId, TaskState, TaskTag};

/// Values a task can produce. Results are cloned out to every waiter.
pub trait TaskOutput: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> TaskOutput for T {}

/// Type-erased view of a task.
///
/// Registries, ambient frames and parent/child links only need this much;
/// the result type stays with the typed `Task<T>` handle.
#[async_trait]
pub trait TaskInfo: Send + Sync + fmt::Debug {
    fn core(&self) -> &TaskCore;

    /// Run the job to completion on the current async task and store the
    /// outcome. The caller marks the task running first; a task that is
    /// already finished (cancelled while queued, say) is left alone.
    async fn run(self: Arc<Self>);

    /// Stored failure, if the task finished unsuccessfully.
    fn failure(&self) -> Option<JobError>;
}

pub type TaskRef = Arc<dyn TaskInfo>;

impl dyn TaskInfo {
    pub fn id(&self) -> TaskId {
        self.core().id()
    }

    pub fn display_name(&self) -> &str {
        self.core().display_name()
    }

    pub fn tags(&self) -> TagSet {
        self.core().tags()
    }

    pub fn state(&self) -> TaskState {
        self.core().state()
    }

    pub fn is_done(&self) -> bool {
        self.core().is_done()
    }

    pub fn add_child(&self, child: TaskRef) -> Result<(), ContextError> {
        self.core().add_child(child)
    }

    pub fn summary(&self) -> TaskSummary {
        self.core().summary()
    }
}

struct TaskInner<T> {
    core: TaskCore,
    job: Job<T>,
    result: Mutex<Option<Result<T, JobError>>>,
}

impl<T: TaskOutput> TaskInner<T> {
    /// Store the outcome and move to a terminal state.
    ///
    /// The result is written before the state flips so that anyone woken by
    /// the transition sees it. Returns `false` if the task had already
    /// finished (typically cancelled); the outcome is discarded then.
    fn complete(&self, outcome: Result<T, JobError>) -> bool {
        let mut slot = self.result.lock();
        if self.core.is_done() {
            return false;
        }
        let succeeded = outcome.is_ok();
        *slot = Some(outcome);
        if self.core.mark_finished(succeeded) {
            true
        } else {
            *slot = None;
            false
        }
    }

    fn result_now(&self) -> Result<T, ContextError> {
        match self.core.state() {
            TaskState::Done | TaskState::Failed => match self.result.lock().as_ref() {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(err)) => Err(ContextError::from_job(err.clone())),
                None => Err(ContextError::Cancelled(self.core.id())),
            },
            TaskState::Cancelled => Err(ContextError::Cancelled(self.core.id())),
            TaskState::Unsubmitted | TaskState::Queued | TaskState::Running => {
                Err(ContextError::InProgress {
                    task: self.core.id(),
                    name: self.core.display_name().to_string(),
                })
            }
        }
    }
}

/// Cancels the task if the run is torn down before it produced an outcome.
struct AbandonGuard<'a> {
    core: &'a TaskCore,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.core.cancel() {
            tracing::warn!(task = %self.core.id(), "task abandoned before completing");
        }
    }
}

#[async_trait]
impl<T: TaskOutput> TaskInfo for TaskInner<T> {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    async fn run(self: Arc<Self>) {
        if self.core.is_done() {
            return;
        }
        let mut guard = AbandonGuard {
            core: &self.core,
            armed: true,
        };
        let outcome = self.job.call().await;
        guard.armed = false;

        match outcome {
            Err(JobError::Interrupted) => {
                self.core.cancel();
            }
            outcome => {
                if let Err(err) = &outcome {
                    tracing::debug!(task = %self.core.id(), error = %err, "task failed");
                }
                self.complete(outcome);
            }
        }
    }

    fn failure(&self) -> Option<JobError> {
        match self.result.lock().as_ref() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }
}

impl<T> fmt::Debug for TaskInner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.core.id())
            .field("name", &self.core.display_name())
            .field("state", &self.core.state())
            .finish()
    }
}

/// Typed handle to a unit of work.
///
/// Cloning the handle is cheap; all clones refer to the same task.
pub struct Task<T> {
    inner: Arc<TaskInner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: TaskOutput> Task<T> {
    pub(crate) fn new(display_name: String, description: String, tags: TagSet, job: Job<T>) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                core: TaskCore::new(display_name, description, tags),
                job,
                result: Mutex::new(None),
            }),
        }
    }

    pub fn from_job(display_name: impl Into<String>, job: Job<T>) -> Self {
        Self::new(display_name.into(), String::new(), TagSet::new(), job)
    }

    /// Throwaway task hosting an immediate evaluation.
    ///
    /// `carried` are tags taken over from the work being evaluated.
    pub(crate) fn placeholder(display_name: String, description: String, carried: TagSet) -> Self {
        let mut tags = carried;
        tags.insert(TaskTag::Immediate);
        tags.insert(TaskTag::Transient);
        Self::new(
            display_name,
            description,
            tags,
            Job::from_fn(|| Err(JobError::failed("placeholder task is not runnable"))),
        )
    }

    pub fn core(&self) -> &TaskCore {
        &self.inner.core
    }

    pub fn id(&self) -> TaskId {
        self.inner.core.id()
    }

    pub fn display_name(&self) -> &str {
        self.inner.core.display_name()
    }

    pub fn tags(&self) -> TagSet {
        self.inner.core.tags()
    }

    pub fn state(&self) -> TaskState {
        self.inner.core.state()
    }

    pub fn is_queued_or_submitted(&self) -> bool {
        self.inner.core.is_queued_or_submitted()
    }

    pub fn is_done(&self) -> bool {
        self.inner.core.is_done()
    }

    pub fn job(&self) -> Job<T> {
        self.inner.job.clone()
    }

    pub fn as_task_ref(&self) -> TaskRef {
        self.inner.clone()
    }

    pub fn add_child(&self, child: TaskRef) -> Result<(), ContextError> {
        self.inner.core.add_child(child)
    }

    pub fn cancel(&self) -> bool {
        self.inner.core.cancel()
    }

    /// The result without waiting: `InProgress` unless the task has finished.
    pub fn result_now(&self) -> Result<T, ContextError> {
        self.inner.result_now()
    }

    /// Wait for the task to finish and return its result.
    pub async fn join(&self) -> Result<T, ContextError> {
        self.inner.core.wait_done().await;
        self.inner.result_now()
    }

    pub(crate) fn complete(&self, outcome: Result<T, JobError>) -> bool {
        self.inner.complete(outcome)
    }

    pub fn summary(&self) -> TaskSummary {
        self.inner.core.summary()
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}
