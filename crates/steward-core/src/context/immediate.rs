//! Non-blocking evaluation.
//!
//! Work is evaluated on the caller's thread inside a throwaway placeholder
//! task. A job future gets exactly one poll: if it is not ready by then it
//! would have to wait, so it is dropped and the evaluation is reported as
//! unsupported.

use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use super::ExecutionContext;
use crate::ambient;
use crate::domain::{ContextError, JobError, TagSet, TaskTag};
use crate::task::{ImmediateSupplier, ImmediateWork, Job, Task, TaskOutput};

enum Evaluation<T> {
    /// Yields without suspending by contract.
    Native(Arc<dyn ImmediateSupplier<T>>),
    /// An ordinary job, tried once.
    Interruptible(Job<T>),
}

impl<T: TaskOutput> Evaluation<T> {
    fn evaluate(&self) -> Result<T, JobError> {
        match self {
            Evaluation::Native(supplier) => supplier.get_immediately(),
            Evaluation::Interruptible(job) => {
                let mut fut = job.call();
                let mut cx = Context::from_waker(Waker::noop());
                match fut.as_mut().poll(&mut cx) {
                    Poll::Ready(Err(JobError::Interrupted)) => Err(JobError::ImmediateUnsupported(
                        "job was interrupted".to_string(),
                    )),
                    Poll::Ready(outcome) => outcome,
                    Poll::Pending => Err(JobError::ImmediateUnsupported(
                        "job would have to wait".to_string(),
                    )),
                }
            }
        }
    }
}

/// Puts the caller's interrupt flag back once the evaluation is over.
struct RestoreInterrupt(bool);

impl Drop for RestoreInterrupt {
    fn drop(&mut self) {
        if self.0 {
            ambient::interrupt();
        }
    }
}

fn anonymous_placeholder<T: TaskOutput>() -> Task<T> {
    Task::placeholder("immediate evaluation".to_string(), String::new(), TagSet::new())
}

impl ExecutionContext {
    /// Evaluate `work` only if that can be done without waiting.
    ///
    /// - A task that was already submitted yields its stored result, or
    ///   `InProgress` if it has not finished. It is never run again.
    /// - Anything else runs on the caller's thread; `ImmediateUnsupported` is
    ///   returned if it cannot complete without waiting.
    ///
    /// The task passed in is never marked submitted by this call; a
    /// placeholder task tagged `IMMEDIATE` and `TRANSIENT` hosts the run.
    pub fn get_immediately<T: TaskOutput>(
        &self,
        work: impl Into<ImmediateWork<T>>,
    ) -> Result<T, ContextError> {
        let work: ImmediateWork<T> = work.into();
        let (placeholder, evaluation) = match work {
            ImmediateWork::Task(task) => {
                if task.is_queued_or_submitted() {
                    return task.result_now();
                }
                let carried: TagSet = task
                    .tags()
                    .iter()
                    .filter(|t| matches!(t, TaskTag::Label(_) | TaskTag::Entitlement(_)))
                    .cloned()
                    .collect();
                let placeholder = Task::placeholder(
                    task.display_name().to_string(),
                    task.core().description().to_string(),
                    carried,
                );
                (placeholder, Evaluation::Interruptible(task.job()))
            }
            ImmediateWork::Callable(job) => {
                (anonymous_placeholder(), Evaluation::Interruptible(job))
            }
            ImmediateWork::Supplier(supplier) => {
                (anonymous_placeholder(), Evaluation::Native(supplier))
            }
            ImmediateWork::Dynamic(value) => {
                return self.get_immediately(ImmediateWork::from_any(value)?);
            }
        };

        self.run_in_same_thread_sync(&placeholder, || {
            placeholder.cancel();
            let _restore = RestoreInterrupt(ambient::take_interrupt());
            evaluation.evaluate()
        })?
        .map_err(ContextError::from_job)
    }
}
