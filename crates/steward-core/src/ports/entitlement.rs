use crate::domain::EntitlementContext;

/// Source of the entitlement to stamp on submitted work that has none.
pub trait EntitlementProvider: Send + Sync {
    fn current(&self) -> Option<EntitlementContext>;
}
