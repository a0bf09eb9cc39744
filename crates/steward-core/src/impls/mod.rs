//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryRegistry**: tokio 上でタスクを実行するプロセス内レジストリ
//! - **AmbientEntitlements** / **FixedEntitlements**: entitlement の供給元

pub mod entitlements;
pub mod inmem_registry;

pub use self::entitlements::{AmbientEntitlements, FixedEntitlements};
pub use self::inmem_registry::InMemoryRegistry;
