//! App - アプリケーション層
//!
//! ports と実行コンテキストを組み合わせて、管理対象の owner ごとの
//! コンテキストを提供します。
//!
//! # 主要コンポーネント
//! - **ManagementBuilder**: 構築とワイヤリング（起動時検証付き）
//! - **Management**: owner → ExecutionContext の対応表、コンテキスト解決
//! - **StewardConfig**: 設定（JSON）
//! - **TaskNode / TaskCounts**: 表示用ビュー

pub mod builder;
pub mod config;
pub mod management;
pub mod status;

pub use self::builder::{BuildError, ManagementBuilder};
pub use self::config::{ConfigError, RegistryConfig, StewardConfig};
pub use self::management::Management;
pub use self::status::{TaskCounts, TaskNode};
