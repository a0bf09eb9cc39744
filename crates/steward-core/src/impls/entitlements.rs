//! EntitlementProvider の実装

use crate::ambient;
use crate::domain::EntitlementContext;
use crate::ports::EntitlementProvider;

/// Reads the entitlement of the current ambient frame.
///
/// Work submitted from a running task therefore carries that task's
/// entitlement, and [`ambient::with_entitlement`] sets it for callers
/// outside any task.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientEntitlements;

impl EntitlementProvider for AmbientEntitlements {
    fn current(&self) -> Option<EntitlementContext> {
        ambient::current_entitlement()
    }
}

/// Always the same entitlement (system work, tests).
#[derive(Debug, Clone)]
pub struct FixedEntitlements(EntitlementContext);

impl FixedEntitlements {
    pub fn new(entitlement: EntitlementContext) -> Self {
        Self(entitlement)
    }
}

impl EntitlementProvider for FixedEntitlements {
    fn current(&self) -> Option<EntitlementContext> {
        Some(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ambient_provider_follows_the_frame() {
        assert_eq!(AmbientEntitlements.current(), None);
        let ent = EntitlementContext::for_user("carol");
        let seen = ambient::with_entitlement(ent.clone(), async { AmbientEntitlements.current() }).await;
        assert_eq!(seen, Some(ent));
    }

    #[test]
    fn fixed_provider_is_constant() {
        let p = FixedEntitlements::new(EntitlementContext::for_user("system"));
        assert_eq!(p.current().map(|e| e.user), Some("system".to_string()));
    }
}
