//! ExecutionContext - 実行コンテキスト
//!
//! 固定タグを持ち、投入されたタスクにそのタグを付けてレジストリに渡す窓口です。
//!
//! # 主要な操作
//! - **submit**: タスクを非同期実行に投入（必要ならコンテキスト切替）
//! - **get**: 未投入タスクを呼び出し元で実行して結果を返す
//! - **get_immediately**: ブロックせずに評価できる場合のみ値を返す
//! - **get_tasks**: 固定タグをすべて持つタスクの一覧

mod immediate;
mod inline;
mod submit;

use std::fmt;
use std::sync::{Arc, Weak};

use crate::domain::{ContextError, ContextId, OwnerId, OwnerRef, TagSet, TaskTag};
use crate::impls::AmbientEntitlements;
use crate::ports::{ContextResolver, EntitlementProvider, ExecutionRegistry};
use crate::task::TaskRef;

struct ContextInner {
    id: ContextId,
    tags: TagSet,
    registry: Arc<dyn ExecutionRegistry>,
    resolver: Option<Weak<dyn ContextResolver>>,
    entitlements: Arc<dyn EntitlementProvider>,
}

/// A tagged front door to an execution registry.
///
/// Cheap to clone; clones are the same context. Two contexts are equal when
/// they are the same context, not when their tags match.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl ExecutionContext {
    pub fn builder(registry: Arc<dyn ExecutionRegistry>) -> ContextBuilder {
        ContextBuilder::new(registry)
    }

    /// Context with fixed `tags` and no owner resolution.
    pub fn new(registry: Arc<dyn ExecutionRegistry>, tags: TagSet) -> Self {
        Self::builder(registry).tags(&tags).build()
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Fixed tags applied to everything submitted here.
    pub fn tags(&self) -> &TagSet {
        &self.inner.tags
    }

    pub fn owner(&self) -> Option<&OwnerRef> {
        self.inner.tags.context_owner()
    }

    pub fn registry(&self) -> &Arc<dyn ExecutionRegistry> {
        &self.inner.registry
    }

    /// Every task the registry knows that carries all of this context's tags.
    pub fn get_tasks(&self) -> Vec<TaskRef> {
        self.inner.registry.tasks_with_all_tags(&self.inner.tags)
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.registry.is_shutdown()
    }

    fn resolve(&self, owner: &OwnerId) -> Result<ExecutionContext, ContextError> {
        self.inner
            .resolver
            .as_ref()
            .and_then(Weak::upgrade)
            .and_then(|resolver| resolver.context_for(owner))
            .ok_or_else(|| ContextError::UnknownOwner(owner.clone()))
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ExecutionContext {}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutionContext({}){}", self.inner.id, self.inner.tags)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Builder for [`ExecutionContext`].
pub struct ContextBuilder {
    registry: Arc<dyn ExecutionRegistry>,
    tags: TagSet,
    resolver: Option<Weak<dyn ContextResolver>>,
    entitlements: Option<Arc<dyn EntitlementProvider>>,
}

impl ContextBuilder {
    fn new(registry: Arc<dyn ExecutionRegistry>) -> Self {
        Self {
            registry,
            tags: TagSet::new(),
            resolver: None,
            entitlements: None,
        }
    }

    pub fn tag(mut self, tag: TaskTag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn tags(mut self, tags: &TagSet) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Tag the context with its owner.
    pub fn owner(self, owner: OwnerRef) -> Self {
        self.tag(TaskTag::ContextOwner(owner))
    }

    pub fn resolver(mut self, resolver: Weak<dyn ContextResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn entitlements(mut self, provider: Arc<dyn EntitlementProvider>) -> Self {
        self.entitlements = Some(provider);
        self
    }

    pub fn build(self) -> ExecutionContext {
        let context = ExecutionContext {
            inner: Arc::new(ContextInner {
                id: ContextId::generate(),
                tags: self.tags,
                registry: self.registry,
                resolver: self.resolver,
                entitlements: self
                    .entitlements
                    .unwrap_or_else(|| Arc::new(AmbientEntitlements)),
            }),
        };
        if let Some(owner) = context.owner().filter(|o| o.is_proxied()) {
            tracing::warn!(
                context = %context,
                owner = %owner,
                "context owner is a proxy; contexts should be tagged with the real owner"
            );
        }
        context
    }
}
