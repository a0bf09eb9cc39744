//! Management - owner ごとの実行コンテキストの管理
//!
//! # 役割
//! - 管理対象の owner ごとに `ExecutionContext` を 1 つ作る
//! - `ContextResolver` として、コンテキスト切替時に対象のコンテキストを返す
//! - owner に紐付かない仕事用のサーバーコンテキストを持つ

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info};

use super::status::{TaskCounts, TaskNode};
use crate::context::ExecutionContext;
use crate::domain::{ContextError, OwnerId, OwnerRef, TaskId, TaskTag};
use crate::impls::AmbientEntitlements;
use crate::ports::{ContextResolver, EntitlementProvider, ExecutionRegistry, SubmitProperties};
use crate::task::{Task, TaskOutput, Work};

pub struct Management {
    registry: Arc<dyn ExecutionRegistry>,
    entitlements: Arc<dyn EntitlementProvider>,
    contexts: RwLock<HashMap<OwnerId, ExecutionContext>>,
    server: ExecutionContext,
    this: Weak<Management>,
}

impl Management {
    pub fn new(registry: Arc<dyn ExecutionRegistry>) -> Arc<Self> {
        Self::with_entitlements(registry, Arc::new(AmbientEntitlements))
    }

    pub fn with_entitlements(
        registry: Arc<dyn ExecutionRegistry>,
        entitlements: Arc<dyn EntitlementProvider>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Management>| {
            let resolver: Weak<dyn ContextResolver> = this.clone();
            let server = ExecutionContext::builder(Arc::clone(&registry))
                .resolver(resolver)
                .entitlements(Arc::clone(&entitlements))
                .build();
            Self {
                registry,
                entitlements,
                contexts: RwLock::new(HashMap::new()),
                server,
                this: this.clone(),
            }
        })
    }

    pub fn registry(&self) -> &Arc<dyn ExecutionRegistry> {
        &self.registry
    }

    /// Context for work not tied to any owner.
    pub fn server_context(&self) -> &ExecutionContext {
        &self.server
    }

    /// Start managing `owner`, returning its context. Idempotent.
    pub fn manage(&self, owner: OwnerRef) -> ExecutionContext {
        let mut contexts = self.contexts.write();
        if let Some(existing) = contexts.get(owner.id()) {
            return existing.clone();
        }
        let resolver: Weak<dyn ContextResolver> = self.this.clone();
        let context = ExecutionContext::builder(Arc::clone(&self.registry))
            .owner(owner.clone())
            .resolver(resolver)
            .entitlements(Arc::clone(&self.entitlements))
            .build();
        info!(owner = %owner, context = %context, "owner managed");
        contexts.insert(owner.id().clone(), context.clone());
        context
    }

    /// Stop managing `owner`. Work already submitted is unaffected, but new
    /// work targeting the owner fails with `UnknownOwner`.
    pub fn unmanage(&self, owner: &OwnerId) -> Option<ExecutionContext> {
        let removed = self.contexts.write().remove(owner);
        if removed.is_some() {
            info!(owner = %owner, "owner unmanaged");
        }
        removed
    }

    pub fn is_managed(&self, owner: &OwnerId) -> bool {
        self.contexts.read().contains_key(owner)
    }

    pub fn owners(&self) -> Vec<OwnerId> {
        let mut owners: Vec<OwnerId> = self.contexts.read().keys().cloned().collect();
        owners.sort();
        owners
    }

    /// Submit work on behalf of `owner`.
    ///
    /// The work is tagged with `owner` as its target, so when this is called
    /// from a task running for another owner it is routed across contexts.
    pub fn submit_for<T: TaskOutput>(
        &self,
        owner: &OwnerRef,
        work: impl Into<Work<T>>,
    ) -> Result<Task<T>, ContextError> {
        let context = self
            .context_for(owner.id())
            .ok_or_else(|| ContextError::UnknownOwner(owner.id().clone()))?;
        let origin = crate::ambient::current_context().unwrap_or(context);
        debug!(owner = %owner, via = %origin, "submitting work for owner");
        origin.submit_with(
            SubmitProperties::new().tag(TaskTag::TargetOwner(owner.clone())),
            work,
        )
    }

    /// The task and all of its descendants.
    pub fn task_tree(&self, id: TaskId) -> Option<TaskNode> {
        self.registry.task(id).map(|t| TaskNode::from_task(&t))
    }

    /// Tasks submitted through `owner`'s context, by state.
    pub fn task_counts(&self, owner: &OwnerId) -> Option<TaskCounts> {
        let context = self.context_for(owner)?;
        Some(TaskCounts::from_states(
            context.get_tasks().iter().map(|t| t.state()),
        ))
    }
}

impl ContextResolver for Management {
    fn context_for(&self, owner: &OwnerId) -> Option<ExecutionContext> {
        self.contexts.read().get(owner).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RegistryConfig;
    use crate::impls::InMemoryRegistry;
    use crate::task::Job;

    fn mgmt() -> Arc<Management> {
        Management::new(Arc::new(InMemoryRegistry::new(RegistryConfig::default())))
    }

    #[test]
    fn manage_is_idempotent() {
        let m = mgmt();
        let a1 = m.manage(OwnerRef::new("a", "app"));
        let a2 = m.manage(OwnerRef::new("a", "app"));
        assert_eq!(a1, a2);
        assert_eq!(m.owners(), vec![OwnerId::new("a")]);
        assert_eq!(m.context_for(&OwnerId::new("a")), Some(a1));
    }

    #[test]
    fn unmanage_removes_context() {
        let m = mgmt();
        m.manage(OwnerRef::new("a", "app"));
        assert!(m.unmanage(&OwnerId::new("a")).is_some());
        assert!(!m.is_managed(&OwnerId::new("a")));
        assert!(m.unmanage(&OwnerId::new("a")).is_none());
    }

    #[test]
    fn server_context_has_no_owner() {
        let m = mgmt();
        assert!(m.server_context().owner().is_none());
        assert!(m.server_context().tags().is_empty());
    }

    #[tokio::test]
    async fn submit_for_from_outside_any_task_runs_in_owner_context() {
        let m = mgmt();
        let db = OwnerRef::new("db", "database");
        m.manage(db.clone());
        let task = m.submit_for(&db, Job::from_fn(|| Ok("up"))).unwrap();
        assert_eq!(task.join().await.unwrap(), "up");
        assert!(task.tags().has_context_owner(db.id()));
        assert!(task.tags().contains(&TaskTag::TargetOwner(db.clone())));
    }

    #[tokio::test]
    async fn submit_for_from_another_owner_builds_tree() {
        let m = mgmt();
        let app = OwnerRef::new("app", "web app");
        let db = OwnerRef::new("db", "database");
        let app_ctx = m.manage(app.clone());
        m.manage(db.clone());

        let start = {
            let m = Arc::clone(&m);
            let db = db.clone();
            Job::new(move || {
                let m = Arc::clone(&m);
                let db = db.clone();
                async move {
                    let wrapper = m
                        .submit_for(&db, Job::from_fn(|| Ok(())))
                        .map_err(ContextError::into_job_error)?;
                    wrapper.join().await.map_err(ContextError::into_job_error)?;
                    Ok(wrapper.id())
                }
            })
        };
        let root = app_ctx
            .submit_with(SubmitProperties::new().display_name("start"), start)
            .unwrap();
        let wrapper_id = root.join().await.unwrap();

        let tree = m.task_tree(wrapper_id).unwrap();
        assert_eq!(tree.task.display_name, "Cross-context execution");
        assert_eq!(tree.size(), 2);
        assert!(tree.task.tags.contains(&TaskTag::ContextOwner(app.clone()).to_string()));
        assert!(tree.subtasks[0].task.tags.contains(&TaskTag::ContextOwner(db.clone()).to_string()));

        let db_counts = m.task_counts(db.id()).unwrap();
        assert_eq!(db_counts.done, 1);
        assert_eq!(m.task_counts(app.id()).unwrap().done, 2);
    }

    #[tokio::test]
    async fn unknown_owner_is_rejected() {
        let m = mgmt();
        let ghost = OwnerRef::new("ghost", "ghost");
        assert!(matches!(
            m.submit_for(&ghost, Job::from_fn(|| Ok(()))),
            Err(ContextError::UnknownOwner(_))
        ));
    }
}
