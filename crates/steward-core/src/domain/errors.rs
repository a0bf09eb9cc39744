//! Errors - エラー型と分類
//!
//! - `JobError`: ジョブ自身の結果としての失敗（タスクに保存される）
//! - `ContextError`: 投入・評価 API の呼び出し側に返るエラー

use thiserror::Error;

use super::ids::TaskId;
use super::owner::OwnerId;

/// Failure produced by a job.
///
/// `Interrupted` and `Fatal` are fatal: they are never stored as a task's
/// result and always propagate to whoever is running the job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error("immediate evaluation unsupported: {0}")]
    ImmediateUnsupported(String),

    #[error("interrupted")]
    Interrupted,

    #[error("fatal: {0}")]
    Fatal(String),
}

impl JobError {
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        JobError::Failed(msg.to_string())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, JobError::Interrupted | JobError::Fatal(_))
    }
}

/// Errors surfaced by execution contexts and registries.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// The task is queued but has not finished; the non-waiting paths report
    /// this instead of blocking.
    #[error("task is in progress and incomplete: {name} ({task})")]
    InProgress { task: TaskId, name: String },

    #[error("immediate evaluation unsupported: {0}")]
    ImmediateUnsupported(String),

    #[error("unhandled job kind: {0}")]
    UnhandledJobKind(String),

    #[error("task {0} was already submitted")]
    AlreadySubmitted(TaskId),

    #[error("task {child} already has parent {parent}")]
    AlreadyParented { child: TaskId, parent: TaskId },

    #[error("task {0} was cancelled")]
    Cancelled(TaskId),

    #[error("no execution context for owner {0}")]
    UnknownOwner(OwnerId),

    #[error("execution registry is shut down")]
    Shutdown,

    #[error("no async runtime available to execute tasks")]
    NoRuntime,

    /// Ordinary job failure, rethrown from the task's stored result.
    #[error(transparent)]
    Job(JobError),

    /// Fatal condition raised while running a job inline.
    #[error("fatal condition: {0}")]
    Fatal(JobError),
}

impl ContextError {
    /// Lift a job outcome into the caller-facing error, keeping fatal
    /// conditions distinct from ordinary failures.
    pub fn from_job(err: JobError) -> Self {
        match err {
            JobError::ImmediateUnsupported(msg) => ContextError::ImmediateUnsupported(msg),
            e if e.is_fatal() => ContextError::Fatal(e),
            e => ContextError::Job(e),
        }
    }

    /// Flatten back into a job failure, for work that waits on other work.
    pub fn into_job_error(self) -> JobError {
        match self {
            ContextError::Job(e) | ContextError::Fatal(e) => e,
            ContextError::Cancelled(_) => JobError::Interrupted,
            ContextError::ImmediateUnsupported(msg) => JobError::ImmediateUnsupported(msg),
            other => JobError::Failed(other.to_string()),
        }
    }
}
