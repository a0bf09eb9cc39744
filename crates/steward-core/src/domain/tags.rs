//! Task tags.
//!
//! Tags are how work is classified and found again: the registry indexes tasks
//! by tag, and contexts decide routing from the owner tags.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::owner::{OwnerId, OwnerRef};

/// Access-control token attached to tasks so later authorization decisions
/// know on whose behalf the work runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitlementContext {
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl EntitlementContext {
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            source_ip: None,
            request_uri: None,
            request_id: None,
        }
    }
}

/// A single tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskTag {
    /// Work whose record may be discarded once it completes.
    Transient,
    /// Explicitly kept even when submitted from transient work.
    NonTransient,
    /// Placeholder hosting an immediate evaluation.
    Immediate,
    /// The owner the work is *for*; drives context switching.
    TargetOwner(OwnerRef),
    /// The owner whose context the work was submitted through.
    ContextOwner(OwnerRef),
    Entitlement(EntitlementContext),
    /// Free-form marker.
    Label(String),
}

impl TaskTag {
    pub fn label(s: impl Into<String>) -> Self {
        TaskTag::Label(s.into())
    }

    pub fn is_context_owner(&self) -> bool {
        matches!(self, TaskTag::ContextOwner(_))
    }
}

impl fmt::Display for TaskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskTag::Transient => f.write_str("TRANSIENT"),
            TaskTag::NonTransient => f.write_str("NON_TRANSIENT"),
            TaskTag::Immediate => f.write_str("IMMEDIATE"),
            TaskTag::TargetOwner(owner) => write!(f, "TARGET_OWNER({owner})"),
            TaskTag::ContextOwner(owner) => write!(f, "CONTEXT_OWNER({owner})"),
            TaskTag::Entitlement(ent) => write!(f, "ENTITLEMENT({})", ent.user),
            TaskTag::Label(s) => f.write_str(s),
        }
    }
}

/// Unordered set of tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet(HashSet<TaskTag>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tag: &TaskTag) -> bool {
        self.0.contains(tag)
    }

    pub fn contains_all(&self, other: &TagSet) -> bool {
        other.0.is_subset(&self.0)
    }

    /// Returns `true` if the tag was not present.
    pub fn insert(&mut self, tag: TaskTag) -> bool {
        self.0.insert(tag)
    }

    pub fn remove(&mut self, tag: &TaskTag) -> bool {
        self.0.remove(tag)
    }

    pub fn extend(&mut self, other: &TagSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskTag> {
        self.0.iter()
    }

    /// Remove every tag matching `pred`, returning what was removed.
    pub fn remove_where(&mut self, pred: impl Fn(&TaskTag) -> bool) -> Vec<TaskTag> {
        let removed: Vec<TaskTag> = self.0.iter().filter(|t| pred(*t)).cloned().collect();
        for tag in &removed {
            self.0.remove(tag);
        }
        removed
    }

    pub fn target_owner(&self) -> Option<&OwnerRef> {
        self.0.iter().find_map(|t| match t {
            TaskTag::TargetOwner(owner) => Some(owner),
            _ => None,
        })
    }

    pub fn context_owner(&self) -> Option<&OwnerRef> {
        self.0.iter().find_map(|t| match t {
            TaskTag::ContextOwner(owner) => Some(owner),
            _ => None,
        })
    }

    /// Whether this set carries `CONTEXT_OWNER` for the given owner.
    pub fn has_context_owner(&self, owner: &OwnerId) -> bool {
        self.0
            .iter()
            .any(|t| matches!(t, TaskTag::ContextOwner(o) if o.id() == owner))
    }

    pub fn entitlement(&self) -> Option<&EntitlementContext> {
        self.0.iter().find_map(|t| match t {
            TaskTag::Entitlement(ent) => Some(ent),
            _ => None,
        })
    }

    pub fn is_transient(&self) -> bool {
        self.contains(&TaskTag::Transient)
    }

    /// Explicitly marked one way or the other.
    pub fn has_transience_marker(&self) -> bool {
        self.contains(&TaskTag::Transient) || self.contains(&TaskTag::NonTransient)
    }

    /// Tags rendered as sorted strings (stable output for logs and summaries).
    pub fn to_sorted_strings(&self) -> Vec<String> {
        let mut out: Vec<String> = self.0.iter().map(|t| t.to_string()).collect();
        out.sort();
        out
    }
}

impl FromIterator<TaskTag> for TagSet {
    fn from_iter<I: IntoIterator<Item = TaskTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[TaskTag; N]> for TagSet {
    fn from(tags: [TaskTag; N]) -> Self {
        tags.into_iter().collect()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_sorted_strings().join(", "))
    }
}
