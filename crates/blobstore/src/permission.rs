//! Capability checks consumed by the item operations.
//!
//! Deciding *who* holds which capability (logins, tokens, sessions) happens outside this
//! crate; operations only ask a [`Permissions`] object whether a capability is held.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Admin,
    List,
    Create,
    /// Accepted in permission lists; renaming and retyping items is gated on `Create`.
    Modify,
    Read,
    Delete,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::List => "list",
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Read => "read",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "list" => Ok(Self::List),
            "create" => Ok(Self::Create),
            "modify" => Ok(Self::Modify),
            "read" => Ok(Self::Read),
            "delete" => Ok(Self::Delete),
            _ => Err(format!("Unknown capability: {}", s)),
        }
    }
}

/// Answers "may the caller do X".
pub trait Permissions: Send + Sync {
    fn may(&self, capability: Capability) -> bool;
}

/// A fixed set of granted capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    granted: HashSet<Capability>,
}

impl PermissionSet {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            granted: capabilities.into_iter().collect(),
        }
    }

    /// No capabilities at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list such as `"read,create"`. Empty entries are skipped.
    pub fn parse(list: &str) -> Result<Self, String> {
        let granted = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Capability::from_str)
            .collect::<Result<_, _>>()?;
        Ok(Self { granted })
    }
}

impl FromStr for PermissionSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Permissions for PermissionSet {
    fn may(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }
}

/// Grants everything. Used by local tooling that already owns the storage directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Permissions for AllowAll {
    fn may(&self, _capability: Capability) -> bool {
        true
    }
}
