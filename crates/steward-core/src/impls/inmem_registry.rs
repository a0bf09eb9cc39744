//! InMemoryRegistry - プロセス内のタスクレジストリ
//!
//! # 実装詳細
//! - タスクは tokio ランタイム上で spawn して実行
//! - HashMap<TaskId, TaskRef> が正本、タグ → TaskId 集合の索引を併せ持つ
//! - 完了した TRANSIENT タスクは索引から外す（`retain_transient` で無効化）

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::ambient::{self, Frame};
use crate::app::RegistryConfig;
use crate::domain::{ContextError, JobError, TagSet, TaskId, TaskTag};
use crate::ports::{
    Callback, Clock, ExecutionRegistry, InlineHooks, SubmitProperties, SystemClock,
};
use crate::task::TaskRef;

/// Registry state.
#[derive(Default)]
struct RegistryState {
    /// All tracked tasks (single source of truth).
    tasks: HashMap<TaskId, TaskRef>,
    /// Tag index.
    by_tag: HashMap<TaskTag, HashSet<TaskId>>,
}

impl RegistryState {
    fn index(&mut self, task: &TaskRef) {
        let id = task.id();
        for tag in task.tags().iter() {
            self.by_tag.entry(tag.clone()).or_default().insert(id);
        }
        self.tasks.insert(id, Arc::clone(task));
    }

    fn unindex(&mut self, task: &TaskRef) {
        let id = task.id();
        if self.tasks.remove(&id).is_none() {
            return;
        }
        self.by_tag.retain(|_, ids| {
            ids.remove(&id);
            !ids.is_empty()
        });
    }

    fn with_all_tags(&self, tags: &TagSet) -> BTreeSet<TaskId> {
        let mut sets = tags.iter().map(|t| self.by_tag.get(t));
        let Some(first) = sets.next() else {
            return self.tasks.keys().copied().collect();
        };
        let Some(first) = first else {
            return BTreeSet::new();
        };
        let mut ids: BTreeSet<TaskId> = first.iter().copied().collect();
        for set in sets {
            match set {
                Some(set) => ids.retain(|id| set.contains(id)),
                None => return BTreeSet::new(),
            }
        }
        ids
    }
}

struct RegistryInner {
    state: RwLock<RegistryState>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    shutdown: AtomicBool,
}

impl RegistryInner {
    fn record(&self, task: &TaskRef, extra_tags: &TagSet) -> Result<(), ContextError> {
        if !task.core().mark_submitted() {
            return Err(ContextError::AlreadySubmitted(task.id()));
        }
        task.core().add_tags(extra_tags);
        task.core().record_submitted(self.clock.now());
        self.state.write().index(task);
        Ok(())
    }

    fn started(&self, task: &TaskRef) -> bool {
        task.core().record_started(self.clock.now());
        task.core().mark_running()
    }

    fn finished(&self, task: &TaskRef) {
        task.core().record_ended(self.clock.now());
        let tags = task.tags();
        debug!(task = %task.id(), name = task.display_name(), state = ?task.state(), "task ended");
        if tags.is_transient() && task.is_done() && !self.config.retain_transient {
            self.state.write().unindex(task);
            trace!(task = %task.id(), "transient task forgotten");
        }
    }

    async fn execute(self: Arc<Self>, task: TaskRef, props: SubmitProperties) {
        let frame = Frame::for_pool_task(&task);
        ambient::scope(frame, async {
            let _end = EndOfRun {
                registry: &*self,
                task: &task,
                on_end: props.on_end.clone(),
            };
            if !self.started(&task) {
                // cancelled while queued
                return;
            }
            if let Some(cb) = &props.on_start {
                cb(&task);
            }
            Arc::clone(&task).run().await;
        })
        .await;
    }
}

/// End callback plus bookkeeping, run however the execution ends.
struct EndOfRun<'a> {
    registry: &'a RegistryInner,
    task: &'a TaskRef,
    on_end: Option<Callback>,
}

impl Drop for EndOfRun<'_> {
    fn drop(&mut self) {
        if let Some(cb) = self.on_end.take() {
            cb(self.task);
        }
        self.registry.finished(self.task);
    }
}

/// In-process registry running tasks on the ambient tokio runtime.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct InMemoryRegistry {
    inner: Arc<RegistryInner>,
}

impl InMemoryRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::default()),
                config,
                clock,
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Stop accepting submissions. Tasks already queued still run.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.swap(true, Ordering::SeqCst) {
            debug!("registry shut down");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InlineHooks for InMemoryRegistry {
    fn before_submit_in_same_thread(&self, task: &TaskRef) -> Result<(), ContextError> {
        self.inner.record(task, &TagSet::new())?;
        trace!(task = %task.id(), tags = %task.tags(), "task submitted for inline execution");
        Ok(())
    }

    fn before_start_in_same_thread(&self, task: &TaskRef) {
        self.inner.started(task);
    }

    fn after_end_in_same_thread(&self, task: &TaskRef, error: Option<&JobError>) {
        if let Some(err) = error
            && err.is_fatal()
        {
            warn!(task = %task.id(), error = %err, "inline task ended abnormally");
        }
        self.inner.finished(task);
    }
}

impl ExecutionRegistry for InMemoryRegistry {
    fn submit(&self, props: SubmitProperties, task: TaskRef) -> Result<(), ContextError> {
        if self.is_shutdown() {
            return Err(ContextError::Shutdown);
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ContextError::NoRuntime)?;

        self.inner.record(&task, &props.tags)?;
        debug!(task = %task.id(), name = task.display_name(), tags = %task.tags(), "task queued");

        handle.spawn(Arc::clone(&self.inner).execute(task, props));
        Ok(())
    }

    fn tasks_with_all_tags(&self, tags: &TagSet) -> Vec<TaskRef> {
        let state = self.inner.state.read();
        state
            .with_all_tags(tags)
            .into_iter()
            .filter_map(|id| state.tasks.get(&id).cloned())
            .collect()
    }

    fn task(&self, id: TaskId) -> Option<TaskRef> {
        self.inner.state.read().tasks.get(&id).cloned()
    }

    fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }
}
