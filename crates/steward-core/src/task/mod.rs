//! Task - 実行単位
//!
//! - `Task<T>`: 型付きのハンドル（結果の取得・キャンセル・子タスク）
//! - `TaskRef`: 型を消した参照（レジストリや ambient frame が保持する）
//! - `Job<T>`: タスクの本体（再実行可能なクロージャ）
//! - `Work<T>` / `ImmediateWork<T>`: 投入 API が受け付ける入力の種類

mod builder;
mod core;
mod handle;
mod job;
mod work;

pub use self::builder::TaskBuilder;
pub use self::core::{TaskCore, TaskSummary};
pub use self::handle::{Task, TaskInfo, TaskOutput, TaskRef};
pub use self::job::{BoxFuture, Job};
pub use self::work::{ImmediateSupplier, ImmediateWork, TaskAdaptable, Work};
