use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use super::MembershipRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    /// Path segment of the space; unique among its siblings by way of the path.
    pub uid: String,
    /// Current primary path, filled in by the store.
    pub path: String,
    pub display_name: String,
    pub description: String,
    pub created_by: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Input for creating a space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSpace {
    pub parent_id: Option<i64>,
    pub uid: String,
    pub display_name: String,
    pub description: String,
    /// Creator; becomes an owner of the new space.
    pub created_by: i64,
}

impl NewSpace {
    pub fn root(uid: impl Into<String>, created_by: i64) -> Self {
        let uid = uid.into();
        Self {
            parent_id: None,
            display_name: uid.clone(),
            uid,
            description: String::new(),
            created_by,
        }
    }

    pub fn child(parent_id: i64, uid: impl Into<String>, created_by: i64) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::root(uid, created_by)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub parent_id: i64,
    pub uid: String,
    pub path: String,
    pub description: String,
    pub created_by: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRepository {
    pub parent_id: i64,
    pub uid: String,
    pub description: String,
    pub created_by: i64,
}

impl NewRepository {
    pub fn new(parent_id: i64, uid: impl Into<String>, created_by: i64) -> Self {
        Self {
            parent_id,
            uid: uid.into(),
            description: String::new(),
            created_by,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Space,
    Repository,
}

impl ResourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Space => "space",
            Self::Repository => "repo",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "space" => Ok(Self::Space),
            "repo" => Ok(Self::Repository),
            other => Err(format!("unknown resource kind '{other}'")),
        }
    }
}

/// Handle a path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: i64,
}

impl ResourceRef {
    pub const fn space(id: i64) -> Self {
        Self {
            kind: ResourceKind::Space,
            id,
        }
    }

    pub const fn repo(id: i64) -> Self {
        Self {
            kind: ResourceKind::Repository,
            id,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    pub id: i64,
    pub value: String,
    pub is_primary: bool,
    pub target: ResourceRef,
    pub created_by: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    ServiceAccount,
    Service,
}

impl PrincipalKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ServiceAccount => "serviceaccount",
            Self::Service => "service",
        }
    }
}

impl FromStr for PrincipalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "serviceaccount" => Ok(Self::ServiceAccount),
            "service" => Ok(Self::Service),
            other => Err(format!("unknown principal kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub uid: String,
    pub kind: PrincipalKind,
    pub display_name: String,
    pub email: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrincipal {
    pub uid: String,
    pub kind: PrincipalKind,
    pub display_name: String,
    pub email: String,
}

/// Display projection of a principal, served from the principal info cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalInfo {
    pub id: i64,
    pub uid: String,
    pub display_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<PrincipalKind>,
}

impl From<&Principal> for PrincipalInfo {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.id,
            uid: p.uid.clone(),
            display_name: p.display_name.clone(),
            email: p.email.clone(),
            kind: Some(p.kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipKey {
    pub space_id: i64,
    pub principal_id: i64,
}

impl MembershipKey {
    pub const fn new(space_id: i64, principal_id: i64) -> Self {
        Self {
            space_id,
            principal_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    #[serde(flatten)]
    pub key: MembershipKey,
    pub role: MembershipRole,
    pub created_by: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Membership {
    /// A fresh grant stamped with the current time.
    pub fn new(key: MembershipKey, role: MembershipRole, created_by: i64) -> Self {
        let now = Utc::now().trunc_subsecs(6);
        Self {
            key,
            role,
            created_by,
            created: now,
            updated: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipUser {
    #[serde(flatten)]
    pub membership: Membership,
    pub principal: PrincipalInfo,
    /// Zero-valued when the granting principal no longer exists.
    pub added_by: PrincipalInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipSpace {
    #[serde(flatten)]
    pub membership: Membership,
    pub space: Space,
    pub added_by: PrincipalInfo,
}

// Enum columns are stored as their text form; unknown text surfaces as a
// conversion failure, which the store reports as a data integrity error.
macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_column!(ResourceKind);
text_column!(PrincipalKind);
text_column!(MembershipRole);
