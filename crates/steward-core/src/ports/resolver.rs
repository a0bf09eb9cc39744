use crate::context::ExecutionContext;
use crate::domain::OwnerId;

/// Looks up the execution context of a managed owner.
///
/// Contexts hold their resolver weakly; the management layer that owns the
/// contexts is the usual implementation.
pub trait ContextResolver: Send + Sync {
    fn context_for(&self, owner: &OwnerId) -> Option<ExecutionContext>;
}
