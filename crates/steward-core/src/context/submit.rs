//! Asynchronous submission and cross-context routing.

use std::sync::Arc;

use tracing::{debug, warn};

use super::ExecutionContext;
use crate::ambient;
use crate::domain::{ContextError, OwnerRef, TagSet, TaskTag};
use crate::ports::SubmitProperties;
use crate::task::{Job, Task, TaskBuilder, TaskOutput, TaskRef, Work};

/// Clears the current-context register when dropped.
struct ClearContext;

impl Drop for ClearContext {
    fn drop(&mut self) {
        ambient::set_context(None);
    }
}

impl ExecutionContext {
    pub fn submit<T: TaskOutput>(&self, work: impl Into<Work<T>>) -> Result<Task<T>, ContextError> {
        self.submit_with(SubmitProperties::default(), work)
    }

    /// Submit work for asynchronous execution.
    ///
    /// Work tagged with a `TARGET_OWNER` other than this context's owner is
    /// routed to the target's context. Otherwise the task gets the caller's
    /// entitlement, inherits transience from the submitting task, is stamped
    /// with this context's tags and is handed to the registry.
    ///
    /// The returned handle is the task that will produce the value: the
    /// submitted task itself, or the cross-context wrapper when one was needed.
    pub fn submit_with<T: TaskOutput>(
        &self,
        mut props: SubmitProperties,
        work: impl Into<Work<T>>,
    ) -> Result<Task<T>, ContextError> {
        let work: Work<T> = work.into();
        let (task, was_task) = work.into_task(props.display_name.as_deref())?;
        if task.is_queued_or_submitted() {
            return Err(ContextError::AlreadySubmitted(task.id()));
        }

        let mut tags = task.tags();
        tags.extend(&props.tags);
        let target = tags.target_owner().cloned();
        self.strip_caller_context_owner(&task, &mut props, &mut tags);

        if let Some(target) = target
            && !self.inner.tags.has_context_owner(target.id())
        {
            return self.switch_context(task, was_task, &target, props);
        }

        if tags.entitlement().is_none()
            && let Some(entitlement) = self.inner.entitlements.current()
        {
            tags.insert(TaskTag::Entitlement(entitlement));
        }

        if let Some(current) = ambient::current_task()
            && current.tags().is_transient()
            && !tags.has_transience_marker()
        {
            tags.insert(TaskTag::Transient);
        }

        tags.extend(&self.inner.tags);
        props.tags = tags;
        let props = self.with_context_callbacks(props);

        self.inner.registry.submit(props, task.as_task_ref())?;
        Ok(task)
    }

    /// Callers may not choose the context owner; this context decides it.
    fn strip_caller_context_owner<T: TaskOutput>(
        &self,
        task: &Task<T>,
        props: &mut SubmitProperties,
        merged: &mut TagSet,
    ) {
        let supplied = merged.remove_where(TaskTag::is_context_owner);
        if supplied.is_empty() {
            return;
        }
        props.tags.remove_where(TaskTag::is_context_owner);
        task.core().remove_tags_where(TaskTag::is_context_owner);

        for tag in supplied {
            let TaskTag::ContextOwner(owner) = &tag else {
                continue;
            };
            if self.inner.tags.has_context_owner(owner.id()) {
                debug!(task = %task.id(), owner = %owner, "caller supplied this context's owner tag; removed");
            } else {
                warn!(
                    task = %task.id(),
                    supplied = %owner,
                    context = %self,
                    "caller supplied a context owner tag for a different owner; removed"
                );
            }
        }
    }

    /// Make the context current while the task runs, and clear it afterwards.
    fn with_context_callbacks(&self, mut props: SubmitProperties) -> SubmitProperties {
        let context = self.clone();
        let on_start = props.on_start.take();
        props.on_start = Some(Arc::new(move |task: &TaskRef| {
            ambient::set_context(Some(context.clone()));
            if let Some(cb) = &on_start {
                cb(task);
            }
        }));

        let on_end = props.on_end.take();
        props.on_end = Some(Arc::new(move |task: &TaskRef| {
            let _clear = ClearContext;
            if let Some(cb) = &on_end {
                cb(task);
            }
        }));
        props
    }

    /// Route work tagged for another owner to that owner's context.
    ///
    /// A task already recorded as a child of the current task is submitted
    /// there directly. Anything else is wrapped in a task queued here, which
    /// adopts the real work as its child, submits it to the target, and
    /// finishes only after it does.
    fn switch_context<T: TaskOutput>(
        &self,
        task: Task<T>,
        was_task: bool,
        target: &OwnerRef,
        props: SubmitProperties,
    ) -> Result<Task<T>, ContextError> {
        let target_context = self.resolve(target.id())?;
        let current = ambient::current_task();
        debug!(
            task = %task.id(),
            from = %self,
            to = %target_context,
            current = ?current.as_ref().map(|t| t.id()),
            "switching task context"
        );

        // The child list is read live and may change underneath us; a task
        // added concurrently just takes the wrapper path.
        let tracked_child = was_task
            && !task.is_queued_or_submitted()
            && current
                .as_ref()
                .is_some_and(|c| c.core().has_child(task.id()));
        if tracked_child {
            return target_context.submit_with(props, task);
        }

        let name = if was_task {
            format!("Cross-context execution: {}", describe(&task))
        } else {
            "Cross-context execution".to_string()
        };
        let wrapper = TaskBuilder::new()
            .display_name(name)
            .body(cross_context_job(task, target_context, props))
            .build();
        self.submit(wrapper)
    }
}

fn describe<T: TaskOutput>(task: &Task<T>) -> &str {
    match task.core().description() {
        "" => task.display_name(),
        description => description,
    }
}

fn cross_context_job<T: TaskOutput>(
    real: Task<T>,
    target: ExecutionContext,
    props: SubmitProperties,
) -> Job<T> {
    Job::new(move || {
        let real = real.clone();
        let target = target.clone();
        let props = props.clone();
        async move {
            if let Some(wrapper) = ambient::current_task() {
                wrapper
                    .add_child(real.as_task_ref())
                    .map_err(ContextError::into_job_error)?;
            }
            let queued = target
                .submit_with(props, real)
                .map_err(ContextError::into_job_error)?;
            queued.join().await.map_err(ContextError::into_job_error)
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::super::test_support::*;
    use super::*;
    use crate::domain::{EntitlementContext, JobError, TaskState};
    use crate::impls::FixedEntitlements;

    #[tokio::test]
    async fn submit_runs_on_pool_and_stamps_context_tags() {
        let (_mgmt, a, _b) = two_owners();
        let seen_context = Arc::new(parking_lot::Mutex::new(None));
        let job = {
            let seen_context = seen_context.clone();
            Job::from_fn(move || {
                *seen_context.lock() = ambient::current_context();
                Ok(5u32)
            })
        };
        let task = a.submit(job).unwrap();
        assert_eq!(task.join().await.unwrap(), 5);
        assert!(task.tags().has_context_owner(owner("a").id()));
        assert_eq!(seen_context.lock().clone(), Some(a.clone()));
    }

    #[tokio::test]
    async fn user_end_callback_runs_with_context_still_set() {
        let (_mgmt, a, _b) = two_owners();
        let (tx, rx) = oneshot::channel::<bool>();
        let tx = parking_lot::Mutex::new(Some(tx));
        let props = SubmitProperties::new().on_end(move |_| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(ambient::current_context().is_some());
            }
        });
        a.submit_with(props, Job::runnable(|| {})).unwrap();
        let saw_context = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(saw_context);
    }

    #[tokio::test]
    async fn resubmission_is_rejected() {
        let (_mgmt, a, _b) = two_owners();
        let task = Task::from_job("once", Job::from_fn(|| Ok(1u8)));
        a.submit(task.clone()).unwrap();
        assert!(matches!(
            a.submit(task.clone()),
            Err(ContextError::AlreadySubmitted(id)) if id == task.id()
        ));
    }

    #[tokio::test]
    async fn caller_supplied_context_owner_is_replaced() {
        let (_mgmt, a, _b) = two_owners();
        let task = TaskBuilder::new()
            .display_name("sneaky")
            .tag(TaskTag::ContextOwner(owner("b")))
            .body(Job::from_fn(|| Ok(())))
            .build();
        let task = a.submit(task).unwrap();
        task.join().await.unwrap();
        let tags = task.tags();
        assert!(tags.has_context_owner(owner("a").id()));
        assert!(!tags.has_context_owner(owner("b").id()));
    }

    #[tokio::test]
    async fn entitlement_already_on_task_wins() {
        let registry = registry();
        let provider = Arc::new(FixedEntitlements::new(EntitlementContext::for_user("context-user")));
        let ctx = ExecutionContext::builder(registry).entitlements(provider).build();

        let explicit = EntitlementContext::for_user("explicit");
        let tagged = TaskBuilder::new()
            .tag(TaskTag::Entitlement(explicit.clone()))
            .body(Job::from_fn(|| Ok(())))
            .build();
        let tagged = ctx.submit(tagged).unwrap();
        let plain = ctx.submit(Job::from_fn(|| Ok(()))).unwrap();

        assert_eq!(tagged.tags().entitlement(), Some(&explicit));
        assert_eq!(plain.tags().entitlement().map(|e| e.user.as_str()), Some("context-user"));
    }

    #[tokio::test]
    async fn no_entitlement_anywhere_means_no_tag() {
        let (_mgmt, a, _b) = two_owners();
        let t = a
            .submit(Job::from_fn(|| Ok(ambient::current_entitlement())))
            .unwrap();
        assert_eq!(t.join().await.unwrap(), None);
        assert!(t.tags().entitlement().is_none());
    }

    #[tokio::test]
    async fn ambient_entitlement_is_captured_at_submit() {
        let (_mgmt, a, _b) = two_owners();
        let ent = EntitlementContext::for_user("bob");
        let task = ambient::with_entitlement(ent.clone(), async {
            a.submit(Job::from_fn(|| Ok(ambient::current_entitlement())))
        })
        .await
        .unwrap();
        assert_eq!(task.tags().entitlement(), Some(&ent));
        // the pool task runs with the entitlement it was tagged with
        assert_eq!(task.join().await.unwrap(), Some(ent));
    }

    #[tokio::test]
    async fn work_submitted_from_transient_task_is_transient() {
        let (_mgmt, a, _b) = two_owners();
        let parent = {
            let a = a.clone();
            TaskBuilder::new()
                .tag(TaskTag::Transient)
                .body(Job::new(move || {
                    let a = a.clone();
                    async move {
                        let plain = a.submit(Job::from_fn(|| Ok(()))).map_err(ContextError::into_job_error)?;
                        let kept = a
                            .submit_with(
                                SubmitProperties::new().tag(TaskTag::NonTransient),
                                Job::from_fn(|| Ok(())),
                            )
                            .map_err(ContextError::into_job_error)?;
                        Ok((plain.tags(), kept.tags()))
                    }
                }))
                .build()
        };
        let (plain, kept) = a.submit(parent).unwrap().join().await.unwrap();
        assert!(plain.is_transient());
        assert!(!kept.is_transient());
        assert!(kept.contains(&TaskTag::NonTransient));
    }

    #[tokio::test]
    async fn work_for_another_owner_is_wrapped() {
        let (_mgmt, a, _b) = two_owners();
        let (release, gate) = oneshot::channel::<()>();
        let gate = Arc::new(parking_lot::Mutex::new(Some(gate)));
        let job = Job::new(move || {
            let gate = gate.lock().take();
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(ambient::current_context().and_then(|c| c.owner().cloned()))
            }
        });

        let props = SubmitProperties::new().tag(TaskTag::TargetOwner(owner("b")));
        let wrapper = a.submit_with(props, job).unwrap();
        assert_eq!(wrapper.display_name(), "Cross-context execution");
        assert!(wrapper.tags().has_context_owner(owner("a").id()));

        // wait for the wrapper to hand the real work over
        let real = loop {
            if let Some(child) = wrapper.core().children().pop() {
                break child;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        };
        assert!(!wrapper.is_done());

        let _ = release.send(());
        let ran_under = wrapper.join().await.unwrap();
        assert!(real.is_done());
        assert_eq!(ran_under.map(|o| o.id().clone()), Some(owner("b").id().clone()));
        assert!(real.tags().has_context_owner(owner("b").id()));
        assert!(!real.tags().has_context_owner(owner("a").id()));
        assert_eq!(real.core().parent(), Some(wrapper.id()));
    }

    #[tokio::test]
    async fn tracked_child_switches_directly() {
        let (_mgmt, a, _b) = two_owners();
        let child = TaskBuilder::new()
            .display_name("child for b")
            .tag(TaskTag::TargetOwner(owner("b")))
            .body(Job::from_fn(|| Ok(2u32)))
            .build();

        let parent = {
            let a = a.clone();
            let child = child.clone();
            Job::new(move || {
                let a = a.clone();
                let child = child.clone();
                async move {
                    let me = ambient::current_task().ok_or_else(|| JobError::failed("no current task"))?;
                    me.add_child(child.as_task_ref()).map_err(ContextError::into_job_error)?;
                    let handle = a.submit(child.clone()).map_err(ContextError::into_job_error)?;
                    Ok(handle.id() == child.id())
                }
            })
        };
        let direct = a.submit(parent).unwrap().join().await.unwrap();
        assert!(direct);
        assert_eq!(child.join().await.unwrap(), 2);
        assert!(child.tags().has_context_owner(owner("b").id()));
    }

    #[tokio::test]
    async fn untracked_task_for_another_owner_gets_named_wrapper() {
        let (_mgmt, a, _b) = two_owners();
        let task = TaskBuilder::new()
            .display_name("restart")
            .tag(TaskTag::TargetOwner(owner("b")))
            .body(Job::from_fn(|| Ok(1u8)))
            .build();
        let wrapper = a.submit(task.clone()).unwrap();
        assert_ne!(wrapper.id(), task.id());
        assert_eq!(wrapper.display_name(), "Cross-context execution: restart");
        assert_eq!(wrapper.join().await.unwrap(), 1);
        assert_eq!(task.state(), TaskState::Done);
    }

    #[tokio::test]
    async fn unknown_target_owner_is_an_error() {
        let (_mgmt, a, _b) = two_owners();
        let props = SubmitProperties::new().tag(TaskTag::TargetOwner(owner("nobody")));
        assert!(matches!(
            a.submit_with(props, Job::from_fn(|| Ok(()))),
            Err(ContextError::UnknownOwner(_))
        ));
    }

    #[tokio::test]
    async fn target_matching_this_context_stays_local() {
        let (_mgmt, a, _b) = two_owners();
        let runs = Arc::new(AtomicUsize::new(0));
        let job = {
            let runs = runs.clone();
            Job::from_fn(move || Ok(runs.fetch_add(1, Ordering::SeqCst)))
        };
        let props = SubmitProperties::new().tag(TaskTag::TargetOwner(owner("a")));
        let task = a.submit_with(props, job).unwrap();
        task.join().await.unwrap();
        assert!(task.core().children().is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
