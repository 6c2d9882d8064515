pub mod path;
mod schema;
mod sqlite;

pub use sqlite::{SqliteMembershipStore, SqliteStore};

use crate::context::Context;
use crate::error::Result;
use crate::types::*;

/// Maps globally unique path strings to the resources they name.
pub trait PathStore: Send + Sync {
    /// Resolves a primary or alias path; the input is normalized first.
    fn resolve(&self, ctx: &Context, path: &str) -> Result<ResourceRef>;
    fn find_primary_path(&self, ctx: &Context, resource: ResourceRef) -> Result<Path>;
    /// Adds a path to a resource. A resource has exactly one primary path,
    /// so asking for a second primary fails with `Conflict`.
    fn create_path(
        &self,
        ctx: &Context,
        resource: ResourceRef,
        value: &str,
        is_primary: bool,
        created_by: i64,
    ) -> Result<Path>;
    /// Primary first, then aliases in creation order.
    fn list_paths(&self, ctx: &Context, resource: ResourceRef, filter: &PathFilter)
    -> Result<Vec<Path>>;
    fn delete_path(&self, ctx: &Context, resource: ResourceRef, path_id: i64) -> Result<()>;
}

pub trait SpaceStore: Send + Sync {
    fn find_space(&self, ctx: &Context, id: i64) -> Result<Space>;
    fn find_space_by_path(&self, ctx: &Context, path: &str) -> Result<Space>;
    /// Creates the space, its primary path and an owner membership for the creator.
    fn create_space(&self, ctx: &Context, space: &NewSpace) -> Result<Space>;
    /// Renames and/or reparents a space; `None` moves it to the root.
    fn move_space(
        &self,
        ctx: &Context,
        principal_id: i64,
        space_id: i64,
        new_parent_id: Option<i64>,
        new_uid: &str,
        keep_as_alias: bool,
    ) -> Result<Space>;
    /// Updates display name and description.
    fn update_space(&self, ctx: &Context, space: &Space) -> Result<Space>;
    /// Deletes an empty space together with its paths and memberships.
    fn delete_space(&self, ctx: &Context, id: i64) -> Result<()>;
    fn count_child_spaces(&self, ctx: &Context, id: i64) -> Result<i64>;
    fn list_child_spaces(
        &self,
        ctx: &Context,
        id: i64,
        filter: &ResourceFilter,
    ) -> Result<Vec<Space>>;
    /// Ids from `id` up to its root, `id` first.
    fn list_space_ancestors(&self, ctx: &Context, id: i64) -> Result<Vec<i64>>;
}

pub trait RepoStore: Send + Sync {
    fn find_repo(&self, ctx: &Context, id: i64) -> Result<Repository>;
    fn find_repo_by_path(&self, ctx: &Context, path: &str) -> Result<Repository>;
    fn create_repo(&self, ctx: &Context, repo: &NewRepository) -> Result<Repository>;
    /// Renames a repository and/or moves it to another space.
    fn move_repo(
        &self,
        ctx: &Context,
        principal_id: i64,
        repo_id: i64,
        new_space_id: i64,
        new_uid: &str,
        keep_as_alias: bool,
    ) -> Result<Repository>;
    fn update_repo(&self, ctx: &Context, repo: &Repository) -> Result<Repository>;
    fn delete_repo(&self, ctx: &Context, id: i64) -> Result<()>;
    fn count_repos(&self, ctx: &Context, space_id: i64) -> Result<i64>;
    fn list_repos(
        &self,
        ctx: &Context,
        space_id: i64,
        filter: &ResourceFilter,
    ) -> Result<Vec<Repository>>;
}

pub trait PrincipalStore: Send + Sync {
    fn create_principal(&self, ctx: &Context, principal: &NewPrincipal) -> Result<Principal>;
    fn find_principal(&self, ctx: &Context, id: i64) -> Result<Principal>;
    /// Info records for the given ids in one query; unknown ids are skipped.
    fn find_principal_infos(&self, ctx: &Context, ids: &[i64]) -> Result<Vec<PrincipalInfo>>;
    /// Deletes the principal and every membership it holds.
    fn delete_principal(&self, ctx: &Context, id: i64) -> Result<()>;
}

pub trait MembershipStore: Send + Sync {
    fn find(&self, ctx: &Context, key: MembershipKey) -> Result<Membership>;
    /// Membership plus grantee and granter info. A missing grantee is a data
    /// integrity error; a missing granter leaves `added_by` empty.
    fn find_user(&self, ctx: &Context, key: MembershipKey) -> Result<MembershipUser>;
    fn create(&self, ctx: &Context, membership: &Membership) -> Result<()>;
    /// Overwrites the role and refreshes `updated`.
    fn update(&self, ctx: &Context, membership: &mut Membership) -> Result<()>;
    /// Idempotent.
    fn delete(&self, ctx: &Context, key: MembershipKey) -> Result<()>;
    fn count_users(&self, ctx: &Context, space_id: i64, filter: &MembershipFilter) -> Result<i64>;
    fn list_users(
        &self,
        ctx: &Context,
        space_id: i64,
        filter: &MembershipFilter,
    ) -> Result<Vec<MembershipUser>>;
    /// Every space the principal is a direct member of, ordered by primary path.
    fn list_spaces(&self, ctx: &Context, principal_id: i64) -> Result<Vec<MembershipSpace>>;
    /// Highest role the principal holds on the space or any of its ancestors.
    fn find_effective_role(
        &self,
        ctx: &Context,
        space_id: i64,
        principal_id: i64,
    ) -> Result<Option<MembershipRole>>;
}
