use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier of a managed owner (an entity of the deployed application).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reference to an owner as carried in task tags.
///
/// `proxied` is recorded when the reference is created from a proxy handle
/// rather than the owner itself. Contexts are expected to be tagged with the
/// real owner; `ExecutionContext` warns when it is not.
///
/// Equality and hashing only look at the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerRef {
    id: OwnerId,
    display_name: String,
    #[serde(default)]
    proxied: bool,
}

impl OwnerRef {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: OwnerId::new(id),
            display_name: display_name.into(),
            proxied: false,
        }
    }

    /// A reference obtained through a proxy handle.
    pub fn proxy(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            proxied: true,
            ..Self::new(id, display_name)
        }
    }

    pub fn id(&self) -> &OwnerId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_proxied(&self) -> bool {
        self.proxied
    }
}

impl PartialEq for OwnerRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OwnerRef {}

impl Hash for OwnerRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.display_name, self.id)
    }
}
