use std::fmt;

use serde::{Deserialize, Serialize};

/// Permission represents a bitmask of granted permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u32);

impl Permission {
    pub const SPACE_VIEW: Permission = Permission(1 << 0); // 1
    pub const SPACE_EDIT: Permission = Permission(1 << 1); // 2
    pub const SPACE_DELETE: Permission = Permission(1 << 2); // 4
    pub const REPO_VIEW: Permission = Permission(1 << 3); // 8
    pub const REPO_PUSH: Permission = Permission(1 << 4); // 16
    pub const REPO_EDIT: Permission = Permission(1 << 5); // 32
    pub const REPO_CREATE: Permission = Permission(1 << 6); // 64
    pub const REPO_DELETE: Permission = Permission(1 << 7); // 128
    pub const MEMBERSHIP_MANAGE: Permission = Permission(1 << 8); // 256

    const NAMES: [(Permission, &'static str); 9] = [
        (Self::SPACE_VIEW, "space:view"),
        (Self::SPACE_EDIT, "space:edit"),
        (Self::SPACE_DELETE, "space:delete"),
        (Self::REPO_VIEW, "repo:view"),
        (Self::REPO_PUSH, "repo:push"),
        (Self::REPO_EDIT, "repo:edit"),
        (Self::REPO_CREATE, "repo:create"),
        (Self::REPO_DELETE, "repo:delete"),
        (Self::MEMBERSHIP_MANAGE, "membership:manage"),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if this permission bitmask contains the required permission.
    #[must_use]
    pub const fn has(self, required: Permission) -> bool {
        self.0 & required.0 == required.0
    }

    /// Combines two permission bitmasks.
    #[must_use]
    pub const fn union(self, other: Permission) -> Permission {
        Permission(self.0 | other.0)
    }

    /// Converts a permission string to its bitmask value.
    pub fn parse(s: &str) -> Option<Permission> {
        Self::NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(perm, _)| *perm)
    }

    /// Returns a slice of permission strings for this bitmask.
    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(perm, _)| self.has(*perm))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strings().join(", "))
    }
}
