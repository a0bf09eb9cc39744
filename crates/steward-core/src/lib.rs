//! steward-core
//!
//! Task execution contexts: tagged front doors to a shared task registry.
//!
//! # モジュール構成
//! - **domain**: 値型（ids, owner, tags, state, errors）
//! - **task**: タスク本体（Task, Job, Work, TaskBuilder）
//! - **ambient**: 実行中のタスク・コンテキスト・entitlement の暗黙参照
//! - **ports**: 抽象化レイヤー（ExecutionRegistry, ContextResolver, EntitlementProvider, Clock）
//! - **context**: ExecutionContext（submit / get / get_immediately / get_tasks）
//! - **impls**: 実装（InMemoryRegistry など）
//! - **app**: 管理層（Management, ManagementBuilder, 設定）

pub mod ambient;
pub mod app;
pub mod context;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod task;

pub use app::{Management, ManagementBuilder, StewardConfig};
pub use context::ExecutionContext;
pub use domain::{ContextError, JobError, OwnerRef, TagSet, TaskTag};
pub use task::{Job, Task, TaskBuilder};
