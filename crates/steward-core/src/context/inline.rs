//! Same-thread execution.
//!
//! The caller's frame is saved, the task and this context become current,
//! the job runs, and the caller's frame is visible again afterwards.
//! Registry hooks bracket the run; the end hook fires exactly once even if
//! the run is torn down.

use std::future::Future;

use super::ExecutionContext;
use crate::ambient::{self, Frame};
use crate::domain::{ContextError, JobError};
use crate::ports::ExecutionRegistry;
use crate::task::{Task, TaskOutput, TaskRef};

/// Hooks for one inline run. Dropped without [`InlineRun::end`] means the run
/// never finished (the future was dropped or the job panicked).
struct InlineRun<'a> {
    registry: &'a dyn ExecutionRegistry,
    task: &'a TaskRef,
    ended: bool,
}

impl<'a> InlineRun<'a> {
    fn begin(registry: &'a dyn ExecutionRegistry, task: &'a TaskRef) -> Self {
        registry.before_start_in_same_thread(task);
        Self {
            registry,
            task,
            ended: false,
        }
    }

    fn end(mut self, error: Option<&JobError>) {
        self.ended = true;
        self.registry.after_end_in_same_thread(self.task, error);
    }
}

impl Drop for InlineRun<'_> {
    fn drop(&mut self) {
        if !self.ended {
            self.task.core().cancel();
            self.registry
                .after_end_in_same_thread(self.task, Some(&JobError::Interrupted));
        }
    }
}

/// What came out of an inline run that did not hit a fatal condition.
type Settled<T> = Result<T, JobError>;

impl ExecutionContext {
    /// Run an unsubmitted task here and now, and return its result.
    ///
    /// A task that was already submitted is not run again: its stored result
    /// is returned if it has finished, `InProgress` otherwise.
    pub async fn get<T: TaskOutput>(&self, task: &Task<T>) -> Result<T, ContextError> {
        if task.is_queued_or_submitted() {
            return task.result_now();
        }
        let job = task.job();
        self.run_in_same_thread(task, async move { job.call().await })
            .await?
            .map_err(ContextError::from_job)
    }

    fn enter_same_thread(&self, task: &TaskRef) -> Result<Frame, ContextError> {
        task.core().add_tags(&self.inner.tags);
        self.inner.registry.before_submit_in_same_thread(task)?;
        Ok(Frame::nested(task.clone(), self.clone()))
    }

    pub(crate) async fn run_in_same_thread<T, F>(
        &self,
        task: &Task<T>,
        job: F,
    ) -> Result<Settled<T>, ContextError>
    where
        T: TaskOutput,
        F: Future<Output = Result<T, JobError>>,
    {
        let task_ref = task.as_task_ref();
        let frame = self.enter_same_thread(&task_ref)?;
        ambient::scope(frame, async {
            let run = InlineRun::begin(&*self.inner.registry, &task_ref);
            let outcome = job.await;
            settle(task, run, outcome)
        })
        .await
    }

    pub(crate) fn run_in_same_thread_sync<T, F>(
        &self,
        task: &Task<T>,
        job: F,
    ) -> Result<Settled<T>, ContextError>
    where
        T: TaskOutput,
        F: FnOnce() -> Result<T, JobError>,
    {
        let task_ref = task.as_task_ref();
        let frame = self.enter_same_thread(&task_ref)?;
        ambient::sync_scope(frame, || {
            let run = InlineRun::begin(&*self.inner.registry, &task_ref);
            let outcome = job();
            settle(task, run, outcome)
        })
    }
}

/// Record the outcome on the task and fire the end hook.
///
/// Fatal conditions are not stored as the task's result; the task is left
/// cancelled and the condition goes back to the caller.
fn settle<T: TaskOutput>(
    task: &Task<T>,
    run: InlineRun<'_>,
    outcome: Result<T, JobError>,
) -> Result<Settled<T>, ContextError> {
    match outcome {
        Err(err) if err.is_fatal() => {
            task.cancel();
            run.end(Some(&err));
            Err(ContextError::Fatal(err))
        }
        outcome => {
            task.complete(outcome.clone());
            run.end(outcome.as_ref().err());
            Ok(outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::super::test_support::*;
    use super::*;
    use crate::domain::{TaskState, TaskTag};
    use crate::task::{Job, TaskBuilder};

    fn counting(count: &Arc<AtomicUsize>, outcome: Result<u32, JobError>) -> Task<u32> {
        let count = count.clone();
        Task::from_job(
            "counted",
            Job::from_fn(move || {
                count.fetch_add(1, Ordering::SeqCst);
                outcome.clone()
            }),
        )
    }

    #[tokio::test]
    async fn get_runs_unsubmitted_task_exactly_once() {
        let (_mgmt, a, _b) = two_owners();
        let runs = Arc::new(AtomicUsize::new(0));
        let task = counting(&runs, Ok(9));

        assert_eq!(a.get(&task).await.unwrap(), 9);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), TaskState::Done);
        assert!(task.tags().has_context_owner(owner("a").id()));

        // done: stored result, no rerun
        assert_eq!(a.get(&task).await.unwrap(), 9);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_on_queued_unfinished_task_is_in_progress() {
        let (_mgmt, a, _b) = two_owners();
        let runs = Arc::new(AtomicUsize::new(0));
        let task = counting(&runs, Ok(1));
        task.core().mark_submitted();
        assert!(matches!(a.get(&task).await, Err(ContextError::InProgress { .. })));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn get_sees_task_and_context_as_current() {
        let (_mgmt, a, _b) = two_owners();
        let task = Task::from_job(
            "introspect",
            Job::from_fn(|| {
                Ok((
                    ambient::current_task().map(|t| t.id()),
                    ambient::current_context(),
                ))
            }),
        );
        let (seen_task, seen_context) = a.get(&task).await.unwrap();
        assert_eq!(seen_task, Some(task.id()));
        assert_eq!(seen_context, Some(a.clone()));
        assert!(ambient::current_task().is_none());
        assert!(ambient::current_context().is_none());
    }

    #[tokio::test]
    async fn ambient_frame_is_restored_after_failure_and_fatal_exit() {
        let (_mgmt, a, _b) = two_owners();
        let outer: Task<()> = Task::from_job("outer", Job::from_fn(|| Ok(())));
        let outer_ref = outer.as_task_ref();
        let frame = Frame::nested(outer_ref.clone(), a.clone());

        ambient::scope(frame, async {
            let runs = Arc::new(AtomicUsize::new(0));

            let failing = counting(&runs, Err(JobError::failed("nope")));
            assert!(matches!(a.get(&failing).await, Err(ContextError::Job(_))));
            assert_eq!(failing.state(), TaskState::Failed);
            assert_eq!(ambient::current_task().map(|t| t.id()), Some(outer.id()));

            let fatal = counting(&runs, Err(JobError::Fatal("oom".into())));
            assert!(matches!(a.get(&fatal).await, Err(ContextError::Fatal(_))));
            assert_eq!(fatal.state(), TaskState::Cancelled);
            assert_eq!(ambient::current_task().map(|t| t.id()), Some(outer.id()));
            assert_eq!(ambient::current_context(), Some(a.clone()));
        })
        .await;
    }

    #[tokio::test]
    async fn sync_job_runs_after_hooks_inside_the_frame() {
        let (mgmt, a, _b) = two_owners();
        let registry = Arc::clone(mgmt.registry());
        let task: Task<(bool, TaskState, bool)> = TaskBuilder::new()
            .display_name("transient parent")
            .tag(TaskTag::Transient)
            .body(Job::from_fn(move || {
                let me = ambient::current_task().ok_or_else(|| JobError::failed("no task"))?;
                let known = registry.task(me.id()).is_some();
                let context =
                    ambient::current_context().ok_or_else(|| JobError::failed("no context"))?;
                let child = context
                    .submit(Job::from_fn(|| Ok(())))
                    .map_err(ContextError::into_job_error)?;
                Ok((known, me.state(), child.tags().is_transient()))
            }))
            .build();

        let (known, state, child_transient) = a.get(&task).await.unwrap();
        assert!(known);
        assert_eq!(state, TaskState::Running);
        assert!(child_transient);
    }

    #[tokio::test]
    async fn panicking_job_restores_frame_and_ends_run() {
        let (_mgmt, a, _b) = two_owners();
        let outer: Task<()> = Task::from_job("outer", Job::from_fn(|| Ok(())));
        let frame = Frame::nested(outer.as_task_ref(), a.clone());
        let task: Task<u32> = Task::from_job("panics", Job::from_fn(|| Ok(0)));

        ambient::sync_scope(frame, || {
            let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                a.run_in_same_thread_sync(&task, || -> Result<u32, JobError> {
                    panic!("job blew up")
                })
            }));
            assert!(caught.is_err());
            assert_eq!(ambient::current_task().map(|t| t.id()), Some(outer.id()));
            assert_eq!(ambient::current_context(), Some(a.clone()));
        });
        assert_eq!(task.state(), TaskState::Cancelled);
        assert!(task.core().summary().ended_at.is_some());
    }

    #[tokio::test]
    async fn dropped_inline_run_still_ends() {
        let (_mgmt, a, _b) = two_owners();
        let task: Task<u32> = TaskBuilder::new()
            .tag(TaskTag::label("stuck"))
            .body(Job::new(|| async {
                std::future::pending::<()>().await;
                Ok(0)
            }))
            .build();
        let _ = tokio::time::timeout(std::time::Duration::from_millis(10), a.get(&task)).await;
        assert_eq!(task.state(), TaskState::Cancelled);
        assert!(task.core().summary().ended_at.is_some());
    }

    #[tokio::test]
    async fn concurrent_get_runs_once() {
        let (_mgmt, a, _b) = two_owners();
        let runs = Arc::new(AtomicUsize::new(0));
        let task = counting(&runs, Ok(3));
        let (first, second) = tokio::join!(a.get(&task), a.get(&task));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        // one caller ran it; the other saw it already submitted
        assert!(first.is_ok() || second.is_ok());
        let other = if first.is_ok() { second } else { first };
        match other {
            Ok(v) => assert_eq!(v, 3),
            Err(e) => assert!(matches!(e, ContextError::AlreadySubmitted(_) | ContextError::InProgress { .. })),
        }
    }
}
