//! Inputs accepted by the submission and evaluation entry points.

use std::any::{Any, type_name};
use std::sync::Arc;

use super::builder::TaskBuilder;
use super::handle::{Task, TaskOutput};
use super::job::Job;
use crate::domain::{ContextError, JobError};

/// Something that can present itself as a task.
pub trait TaskAdaptable<T>: Send {
    fn as_task(&self) -> Task<T>;
}

impl<T: TaskOutput> TaskAdaptable<T> for Task<T> {
    fn as_task(&self) -> Task<T> {
        self.clone()
    }
}

/// Work for `submit`.
pub enum Work<T> {
    Task(Task<T>),
    Callable(Job<T>),
    Adaptable(Box<dyn TaskAdaptable<T>>),
    /// Anything else; resolved by downcasting to one of the variants above.
    Dynamic(Box<dyn Any + Send>),
}

impl<T: TaskOutput> Work<T> {
    pub fn callable<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, JobError>> + Send + 'static,
    {
        Work::Callable(Job::new(f))
    }

    pub fn dynamic(value: impl Any + Send) -> Self {
        Work::Dynamic(Box::new(value))
    }

    /// Normalise into a task.
    ///
    /// The flag is `true` when the caller handed over an actual task (directly
    /// or through an adapter) rather than a bare job that had to be wrapped.
    pub(crate) fn into_task(self, display_name: Option<&str>) -> Result<(Task<T>, bool), ContextError> {
        match self {
            Work::Task(task) => Ok((task, true)),
            Work::Adaptable(adaptable) => Ok((adaptable.as_task(), true)),
            Work::Callable(job) => {
                let task = TaskBuilder::new()
                    .display_name(display_name.unwrap_or("anonymous job"))
                    .body(job)
                    .build();
                Ok((task, false))
            }
            Work::Dynamic(value) => Self::from_any(value)?.into_task(display_name),
        }
    }

    fn from_any(value: Box<dyn Any + Send>) -> Result<Self, ContextError> {
        let value = match value.downcast::<Task<T>>() {
            Ok(task) => return Ok(Work::Task(*task)),
            Err(value) => value,
        };
        let value = match value.downcast::<Job<T>>() {
            Ok(job) => return Ok(Work::Callable(*job)),
            Err(value) => value,
        };
        match value.downcast::<Box<dyn TaskAdaptable<T>>>() {
            Ok(adaptable) => Ok(Work::Adaptable(*adaptable)),
            Err(_) => Err(ContextError::UnhandledJobKind(format!(
                "expected a task, job or task adaptable producing {}",
                type_name::<T>()
            ))),
        }
    }
}

impl Work<()> {
    pub fn runnable<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Work::Callable(Job::runnable(f))
    }
}

impl<T> From<Task<T>> for Work<T> {
    fn from(task: Task<T>) -> Self {
        Work::Task(task)
    }
}

impl<T> From<Job<T>> for Work<T> {
    fn from(job: Job<T>) -> Self {
        Work::Callable(job)
    }
}

/// Evaluation that can yield a value without ever suspending.
pub trait ImmediateSupplier<T>: Send + Sync {
    fn get_immediately(&self) -> Result<T, JobError>;
}

/// Work for `get_immediately`.
pub enum ImmediateWork<T> {
    Task(Task<T>),
    Callable(Job<T>),
    Supplier(Arc<dyn ImmediateSupplier<T>>),
    Dynamic(Box<dyn Any + Send>),
}

impl<T: TaskOutput> ImmediateWork<T> {
    pub fn supplier(supplier: impl ImmediateSupplier<T> + 'static) -> Self {
        ImmediateWork::Supplier(Arc::new(supplier))
    }

    pub fn dynamic(value: impl Any + Send) -> Self {
        ImmediateWork::Dynamic(Box::new(value))
    }

    pub(crate) fn from_any(value: Box<dyn Any + Send>) -> Result<Self, ContextError> {
        let value = match value.downcast::<Task<T>>() {
            Ok(task) => return Ok(ImmediateWork::Task(*task)),
            Err(value) => value,
        };
        let value = match value.downcast::<Job<T>>() {
            Ok(job) => return Ok(ImmediateWork::Callable(*job)),
            Err(value) => value,
        };
        match value.downcast::<Arc<dyn ImmediateSupplier<T>>>() {
            Ok(supplier) => Ok(ImmediateWork::Supplier(*supplier)),
            Err(_) => Err(ContextError::UnhandledJobKind(format!(
                "expected a task, job or immediate supplier producing {}",
                type_name::<T>()
            ))),
        }
    }
}

impl<T> From<Task<T>> for ImmediateWork<T> {
    fn from(task: Task<T>) -> Self {
        ImmediateWork::Task(task)
    }
}

impl<T> From<Job<T>> for ImmediateWork<T> {
    fn from(job: Job<T>) -> Self {
        ImmediateWork::Callable(job)
    }
}
