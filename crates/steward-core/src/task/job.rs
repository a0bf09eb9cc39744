use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::handle::TaskOutput;
use crate::domain::JobError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type JobFn<T> = dyn Fn() -> BoxFuture<'static, Result<T, JobError>> + Send + Sync;

/// Body of a task.
///
/// Each call produces a fresh future, so the same job can be evaluated
/// more than once (an immediate attempt followed by a real run, say).
pub struct Job<T> {
    f: Arc<JobFn<T>>,
}

impl<T> Clone for Job<T> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<T: TaskOutput> Job<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, JobError>> + Send + 'static,
    {
        Self {
            f: Arc::new(move || -> BoxFuture<'static, Result<T, JobError>> { Box::pin(f()) }),
        }
    }

    /// A job that never suspends. `f` runs on the first poll, not on `call`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> Result<T, JobError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move || {
            let f = Arc::clone(&f);
            async move { f() }
        })
    }

    pub fn call(&self) -> BoxFuture<'static, Result<T, JobError>> {
        (self.f)()
    }
}

impl Job<()> {
    /// Side-effect only job.
    pub fn runnable<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::from_fn(move || {
            f();
            Ok(())
        })
    }
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Job")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn each_call_is_a_fresh_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let job = {
            let count = count.clone();
            Job::new(move || {
                let count = count.clone();
                async move { Ok(count.fetch_add(1, Ordering::SeqCst) + 1) }
            })
        };
        assert_eq!(job.call().await, Ok(1));
        assert_eq!(job.clone().call().await, Ok(2));
    }

    #[tokio::test]
    async fn runnable_yields_unit() {
        let hit = Arc::new(AtomicUsize::new(0));
        let job = {
            let hit = hit.clone();
            Job::runnable(move || {
                hit.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert_eq!(job.call().await, Ok(()));
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sync_body_waits_for_the_first_poll() {
        let hit = Arc::new(AtomicUsize::new(0));
        let job = {
            let hit = hit.clone();
            Job::from_fn(move || Ok(hit.fetch_add(1, Ordering::SeqCst)))
        };
        let fut = job.call();
        assert_eq!(hit.load(Ordering::SeqCst), 0);
        assert_eq!(fut.await, Ok(0));
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }
}
