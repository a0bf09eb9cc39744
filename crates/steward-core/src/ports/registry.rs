//! ExecutionRegistry port - タスクの実行と追跡
//!
//! レジストリは 2 つの顔を持ちます：
//! - 通常の投入（`submit`）: プールで非同期に実行
//! - 同一スレッド実行のフック（`InlineHooks`）: コンテキストが呼び出し元の
//!   スレッドでタスクを実行するときの記録用

use std::fmt;
use std::sync::Arc;

use crate::domain::{ContextError, JobError, TagSet, TaskId, TaskTag};
use crate::task::TaskRef;

/// Lifecycle callback. Receives the task it is attached to.
pub type Callback = Arc<dyn Fn(&TaskRef) + Send + Sync>;

/// Options accompanying a submission.
#[derive(Clone, Default)]
pub struct SubmitProperties {
    /// Extra tags merged into the task's own.
    pub tags: TagSet,
    /// Name for work handed over as a bare job.
    pub display_name: Option<String>,
    /// Invoked on the executing task right before the job starts.
    pub on_start: Option<Callback>,
    /// Invoked after the job ends, whatever the outcome.
    pub on_end: Option<Callback>,
}

impl SubmitProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: TaskTag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn tags(mut self, tags: &TagSet) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn on_start(mut self, f: impl Fn(&TaskRef) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn on_end(mut self, f: impl Fn(&TaskRef) + Send + Sync + 'static) -> Self {
        self.on_end = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for SubmitProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitProperties")
            .field("tags", &self.tags)
            .field("display_name", &self.display_name)
            .field("on_start", &self.on_start.is_some())
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}

/// Bookkeeping for tasks that a context runs on the caller's own thread.
///
/// Only execution contexts call these, in this order, for every inline run:
/// `before_submit_in_same_thread`, `before_start_in_same_thread`, then
/// `after_end_in_same_thread` exactly once (also on fatal exits).
pub trait InlineHooks: Send + Sync {
    /// Record the task as submitted. Fails if it already was.
    fn before_submit_in_same_thread(&self, task: &TaskRef) -> Result<(), ContextError>;

    fn before_start_in_same_thread(&self, task: &TaskRef);

    /// `error` is the failure the job ended with, if any.
    fn after_end_in_same_thread(&self, task: &TaskRef, error: Option<&JobError>);
}

/// Executes submitted tasks and keeps them findable by tag.
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数のコンテキストから共有される）
pub trait ExecutionRegistry: InlineHooks {
    /// Queue the task for asynchronous execution.
    ///
    /// `props.tags` are added to the task. Fails with `AlreadySubmitted` if
    /// the task was submitted before.
    fn submit(&self, props: SubmitProperties, task: TaskRef) -> Result<(), ContextError>;

    /// Tasks carrying every tag in `tags`, ordered by id.
    fn tasks_with_all_tags(&self, tags: &TagSet) -> Vec<TaskRef>;

    fn task(&self, id: TaskId) -> Option<TaskRef>;

    fn is_shutdown(&self) -> bool;
}
