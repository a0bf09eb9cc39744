//! Domain model (IDs, owners, tags, states, errors).
//!
//! 実行エンジンから独立した値型だけを置きます。

pub mod errors;
pub mod ids;
pub mod owner;
pub mod state;
pub mod tags;

pub use errors::{ContextError, JobError};
pub use ids::{ContextId, TaskId};
pub use owner::{OwnerId, OwnerRef};
pub use state::TaskState;
pub use tags::{EntitlementContext, TagSet, TaskTag};
