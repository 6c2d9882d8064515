use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Permission;

/// Role a principal holds on a space. Variants are declared in ascending
/// order of privilege, so `Ord` compares privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
    Reader,
    Contributor,
    Manager,
    Owner,
}

impl MembershipRole {
    pub const ALL: [MembershipRole; 4] = [
        Self::Reader,
        Self::Contributor,
        Self::Manager,
        Self::Owner,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Contributor => "contributor",
            Self::Manager => "manager",
            Self::Owner => "owner",
        }
    }

    /// Permissions granted by this role on the space and everything below it.
    #[must_use]
    pub const fn permissions(self) -> Permission {
        let reader = Permission::SPACE_VIEW.union(Permission::REPO_VIEW);
        let contributor = reader.union(Permission::REPO_PUSH);
        let manager = contributor
            .union(Permission::SPACE_EDIT)
            .union(Permission::REPO_EDIT)
            .union(Permission::REPO_CREATE)
            .union(Permission::MEMBERSHIP_MANAGE);
        match self {
            Self::Reader => reader,
            Self::Contributor => contributor,
            Self::Manager => manager,
            Self::Owner => manager
                .union(Permission::SPACE_DELETE)
                .union(Permission::REPO_DELETE),
        }
    }

    #[must_use]
    pub fn at_least(self, required: MembershipRole) -> bool {
        self >= required
    }
}

impl fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reader" => Ok(Self::Reader),
            "contributor" => Ok(Self::Contributor),
            "manager" => Ok(Self::Manager),
            "owner" => Ok(Self::Owner),
            other => Err(format!("unknown membership role '{other}'")),
        }
    }
}
