//! Ports - 抽象化レイヤー
//!
//! 実行コンテキストが依存する外部コンポーネントのインターフェースです。
//!
//! - **ExecutionRegistry**: タスクの実行と追跡（スレッドプール + タグ索引）
//! - **ContextResolver**: owner からその実行コンテキストを引く
//! - **EntitlementProvider**: 現在の entitlement を供給
//! - **Clock**: 時刻（テストでは固定）

pub mod clock;
pub mod entitlement;
pub mod registry;
pub mod resolver;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::entitlement::EntitlementProvider;
pub use self::registry::{Callback, ExecutionRegistry, InlineHooks, SubmitProperties};
pub use self::resolver::ContextResolver;
