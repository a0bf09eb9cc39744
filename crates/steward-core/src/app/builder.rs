//! ManagementBuilder - 管理層の構築とワイヤリング
//!
//! 起動時検証（Fail-fast）: 同じ owner を二重に登録しようとすると build() が失敗します。

use std::collections::HashSet;
use std::sync::Arc;

use super::config::StewardConfig;
use super::management::Management;
use crate::domain::OwnerRef;
use crate::impls::{AmbientEntitlements, InMemoryRegistry};
use crate::ports::{Clock, EntitlementProvider, ExecutionRegistry, SystemClock};

/// ManagementBuilder は Management を構築
///
/// # 使用例
/// ```ignore
/// let mgmt = ManagementBuilder::new()
///     .config(config)
///     .owner(OwnerRef::new("app-1", "web app"))
///     .owner(OwnerRef::new("db-1", "database"))
///     .build()?;
/// ```
///
/// レジストリを渡さなければ `InMemoryRegistry` を使います。
pub struct ManagementBuilder {
    config: StewardConfig,
    registry: Option<Arc<dyn ExecutionRegistry>>,
    clock: Option<Arc<dyn Clock>>,
    entitlements: Option<Arc<dyn EntitlementProvider>>,
    owners: Vec<OwnerRef>,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Duplicate owner ids: {0:?}. Each owner can only be managed once.")]
    DuplicateOwners(Vec<String>),
}

impl ManagementBuilder {
    pub fn new() -> Self {
        Self {
            config: StewardConfig::default(),
            registry: None,
            clock: None,
            entitlements: None,
            owners: Vec::new(),
        }
    }

    pub fn config(mut self, config: StewardConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this registry instead of an in-memory one. The registry config
    /// and clock are ignored then.
    pub fn registry(mut self, registry: Arc<dyn ExecutionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn entitlements(mut self, provider: Arc<dyn EntitlementProvider>) -> Self {
        self.entitlements = Some(provider);
        self
    }

    pub fn owner(mut self, owner: OwnerRef) -> Self {
        self.owners.push(owner);
        self
    }

    /// Build and start managing every registered owner.
    ///
    /// # 検証
    /// - 同じ owner id が複数回登録されていれば BuildError::DuplicateOwners
    pub fn build(self) -> Result<Arc<Management>, BuildError> {
        let mut seen = HashSet::new();
        let mut duplicates: Vec<String> = self
            .owners
            .iter()
            .filter(|o| !seen.insert(o.id().clone()))
            .map(|o| o.id().to_string())
            .collect();
        if !duplicates.is_empty() {
            duplicates.sort();
            duplicates.dedup();
            return Err(BuildError::DuplicateOwners(duplicates));
        }

        let registry = self.registry.unwrap_or_else(|| {
            let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
            Arc::new(InMemoryRegistry::with_clock(self.config.registry.clone(), clock))
        });
        let entitlements = self
            .entitlements
            .unwrap_or_else(|| Arc::new(AmbientEntitlements));

        let mgmt = Management::with_entitlements(registry, entitlements);
        for owner in self.owners {
            mgmt.manage(owner);
        }
        Ok(mgmt)
    }
}

impl Default for ManagementBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OwnerId;

    #[test]
    fn test_build_success() {
        let mgmt = ManagementBuilder::new()
            .owner(OwnerRef::new("app-1", "web app"))
            .owner(OwnerRef::new("db-1", "database"))
            .build()
            .unwrap();
        assert_eq!(mgmt.owners(), vec![OwnerId::new("app-1"), OwnerId::new("db-1")]);
    }

    #[test]
    fn test_build_duplicate_owners() {
        let result = ManagementBuilder::new()
            .owner(OwnerRef::new("app-1", "web app"))
            .owner(OwnerRef::new("app-1", "web app again"))
            .owner(OwnerRef::new("db-1", "database"))
            .build();
        assert!(matches!(
            result,
            Err(BuildError::DuplicateOwners(dups)) if dups == vec!["app-1".to_string()]
        ));
    }

    #[test]
    fn test_build_no_owners() {
        let mgmt = ManagementBuilder::default().build().unwrap();
        assert!(mgmt.owners().is_empty());
    }

    #[tokio::test]
    async fn test_build_with_custom_registry() {
        let registry = Arc::new(InMemoryRegistry::new(Default::default()));
        let mgmt = ManagementBuilder::new()
            .registry(registry.clone())
            .owner(OwnerRef::new("app-1", "web app"))
            .build()
            .unwrap();
        let ctx = mgmt.server_context();
        ctx.submit(crate::task::Job::from_fn(|| Ok(()))).unwrap();
        assert_eq!(registry.len(), 1);
    }
}
