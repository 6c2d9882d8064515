use std::collections::HashSet;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::info;

use super::{SqliteStore, format_datetime, like_pattern, membership, now, parse_datetime, paths};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::store::path::join_path;
use crate::store::{PathStore, SpaceStore};
use crate::types::{
    Membership, MembershipKey, MembershipRole, NewSpace, ResourceFilter, ResourceKind,
    ResourceRef, ResourceSort, Space,
};

pub(super) const SPACE_COLUMNS: &str = "s.space_id, s.space_parent_id, s.space_uid, s.space_display_name,
     s.space_description, s.space_created_by, s.space_created, s.space_updated, p.path_value";

pub(super) const SPACE_FROM: &str = "spaces s
     JOIN paths p ON p.path_target_kind = 'space' AND p.path_target_id = s.space_id
                 AND p.path_is_primary = 1";

/// Reads a space from `row` starting at column `offset`.
pub(super) fn space_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Space> {
    Ok(Space {
        id: row.get(offset)?,
        parent_id: row.get(offset + 1)?,
        uid: row.get(offset + 2)?,
        display_name: row.get(offset + 3)?,
        description: row.get(offset + 4)?,
        created_by: row.get(offset + 5)?,
        created: parse_datetime(&row.get::<_, String>(offset + 6)?),
        updated: parse_datetime(&row.get::<_, String>(offset + 7)?),
        path: row.get(offset + 8)?,
    })
}

fn find_in(conn: &Connection, id: i64) -> Result<Space> {
    conn.query_row(
        &format!("SELECT {SPACE_COLUMNS} FROM {SPACE_FROM} WHERE s.space_id = ?1"),
        params![id],
        |row| space_from_row(row, 0),
    )
    .map_err(Error::from)
}

/// Walks from `id` to its root, `id` first. Fails `NotFound` if `id` does not
/// exist and `DataIntegrity` on a cycle or a chain deeper than `max_depth`.
pub(super) fn ancestor_ids(conn: &Connection, id: i64, max_depth: usize) -> Result<Vec<i64>> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(id);

    while let Some(space_id) = current {
        if !visited.insert(space_id) {
            return Err(Error::DataIntegrity(format!(
                "space hierarchy contains a cycle at space {space_id}"
            )));
        }
        if chain.len() >= max_depth {
            return Err(Error::DataIntegrity(format!(
                "space {id} is nested deeper than {max_depth} levels"
            )));
        }

        let parent: Option<i64> = conn
            .query_row(
                "SELECT space_parent_id FROM spaces WHERE space_id = ?1",
                params![space_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| {
                if chain.is_empty() {
                    Error::NotFound
                } else {
                    Error::DataIntegrity(format!("space {space_id} has a dangling parent"))
                }
            })?;

        chain.push(space_id);
        current = parent;
    }

    Ok(chain)
}

fn sort_column(sort: ResourceSort) -> &'static str {
    match sort {
        ResourceSort::Uid => "s.space_uid",
        ResourceSort::Path => "p.path_value",
        ResourceSort::Created => "s.space_created",
        ResourceSort::Updated => "s.space_updated",
    }
}

impl SpaceStore for SqliteStore {
    fn find_space(&self, ctx: &Context, id: i64) -> Result<Space> {
        self.read(ctx, |conn| find_in(conn, id))
    }

    fn find_space_by_path(&self, ctx: &Context, path: &str) -> Result<Space> {
        let target = self.resolve(ctx, path)?;
        if target.kind != ResourceKind::Space {
            return Err(Error::NotFound);
        }
        self.find_space(ctx, target.id)
    }

    fn create_space(&self, ctx: &Context, space: &NewSpace) -> Result<Space> {
        self.write(ctx, |tx| {
            let parent_path = match space.parent_id {
                Some(parent_id) => Some(paths::find_primary(tx, ResourceRef::space(parent_id))?.value),
                None => None,
            };
            let value = join_path(parent_path.as_deref(), &space.uid)?;

            let at = now();
            let ts = format_datetime(&at);
            tx.execute(
                "INSERT INTO spaces (space_parent_id, space_uid, space_display_name, space_description,
                 space_created_by, space_created, space_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    space.parent_id,
                    space.uid,
                    space.display_name,
                    space.description,
                    space.created_by,
                    ts,
                ],
            )?;
            let id = tx.last_insert_rowid();

            paths::insert(tx, ResourceRef::space(id), &value, true, space.created_by, at)?;

            let owner = Membership {
                key: MembershipKey::new(id, space.created_by),
                role: MembershipRole::Owner,
                created_by: space.created_by,
                created: at,
                updated: at,
            };
            membership::insert(tx, &owner)?;

            find_in(tx, id)
        })
    }

    fn move_space(
        &self,
        ctx: &Context,
        principal_id: i64,
        space_id: i64,
        new_parent_id: Option<i64>,
        new_uid: &str,
        keep_as_alias: bool,
    ) -> Result<Space> {
        let max_depth = self.config().max_space_depth;
        self.write(ctx, |tx| {
            let target = ResourceRef::space(space_id);
            let current = paths::find_primary(tx, target)?;

            let parent_path = match new_parent_id {
                Some(parent_id) => {
                    if ancestor_ids(tx, parent_id, max_depth)?.contains(&space_id) {
                        return Err(Error::BadRequest(
                            "Cannot move space into itself or its descendants".to_string(),
                        ));
                    }
                    Some(paths::find_primary(tx, ResourceRef::space(parent_id))?.value)
                }
                None => None,
            };
            let new_value = join_path(parent_path.as_deref(), new_uid)?;

            let at = now();
            ctx.check()?;
            let primary =
                paths::repoint_primary(tx, target, &new_value, keep_as_alias, principal_id, at)?;

            let descendants = if primary.value == current.value {
                0
            } else {
                ctx.check()?;
                paths::repoint_descendants(
                    tx,
                    &current.value,
                    &primary.value,
                    keep_as_alias,
                    principal_id,
                    at,
                )?
            };

            let rows = tx.execute(
                "UPDATE spaces SET space_parent_id = ?1, space_uid = ?2, space_updated = ?3
                 WHERE space_id = ?4",
                params![new_parent_id, new_uid, format_datetime(&at), space_id],
            )?;
            if rows == 0 {
                return Err(Error::NotFound);
            }

            info!(
                space_id,
                from = %current.value,
                to = %primary.value,
                descendants,
                keep_as_alias,
                "Moved space"
            );
            find_in(tx, space_id)
        })
    }

    fn update_space(&self, ctx: &Context, space: &Space) -> Result<Space> {
        self.write(ctx, |tx| {
            let rows = tx.execute(
                "UPDATE spaces SET space_display_name = ?1, space_description = ?2, space_updated = ?3
                 WHERE space_id = ?4",
                params![
                    space.display_name,
                    space.description,
                    format_datetime(&now()),
                    space.id
                ],
            )?;

            if rows == 0 {
                return Err(Error::NotFound);
            }
            find_in(tx, space.id)
        })
    }

    fn delete_space(&self, ctx: &Context, id: i64) -> Result<()> {
        self.write(ctx, |tx| {
            let target = ResourceRef::space(id);
            if !paths::resource_exists(tx, target)? {
                return Err(Error::NotFound);
            }

            let children: i64 = tx.query_row(
                "SELECT (SELECT COUNT(*) FROM spaces WHERE space_parent_id = ?1)
                      + (SELECT COUNT(*) FROM repositories WHERE repo_parent_id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if children > 0 {
                return Err(Error::Conflict(format!(
                    "space {id} still contains {children} spaces or repositories"
                )));
            }

            let removed_paths = paths::delete_all(tx, target)?;
            let removed_members = tx.execute(
                "DELETE FROM memberships WHERE membership_space_id = ?1",
                params![id],
            )?;
            tx.execute("DELETE FROM spaces WHERE space_id = ?1", params![id])?;

            info!(space_id = id, removed_paths, removed_members, "Deleted space");
            Ok(())
        })
    }

    fn count_child_spaces(&self, ctx: &Context, id: i64) -> Result<i64> {
        self.read(ctx, |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM spaces WHERE space_parent_id = ?1",
                params![id],
                |row| row.get(0),
            )?)
        })
    }

    fn list_child_spaces(
        &self,
        ctx: &Context,
        id: i64,
        filter: &ResourceFilter,
    ) -> Result<Vec<Space>> {
        let mut sql = format!("SELECT {SPACE_COLUMNS} FROM {SPACE_FROM} WHERE s.space_parent_id = ?");
        let mut args = vec![Value::Integer(id)];

        if !filter.query.is_empty() {
            sql.push_str(" AND fold_case(s.space_uid) LIKE ? ESCAPE '\\'");
            args.push(Value::Text(like_pattern(&filter.query)));
        }

        sql.push_str(&format!(
            " ORDER BY {} {}, s.space_id ASC LIMIT ? OFFSET ?",
            sort_column(filter.sort),
            filter.order.as_sql()
        ));
        args.push(Value::Integer(i64::from(self.config().limit(filter.size))));
        args.push(Value::Integer(self.config().offset(filter.page, filter.size) as i64));

        self.read(ctx, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), |row| space_from_row(row, 0))?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
    }

    fn list_space_ancestors(&self, ctx: &Context, id: i64) -> Result<Vec<i64>> {
        let max_depth = self.config().max_space_depth;
        self.read(ctx, |conn| ancestor_ids(conn, id, max_depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PrincipalStore, RepoStore};
    use crate::types::{NewPrincipal, NewRepository, PathFilter, PrincipalKind};
    use tempfile::TempDir;

    fn setup() -> (TempDir, SqliteStore, i64) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        let owner = store
            .create_principal(
                &Context::background(),
                &NewPrincipal {
                    uid: "root".to_string(),
                    kind: PrincipalKind::User,
                    display_name: "Root".to_string(),
                    email: "root@example.com".to_string(),
                },
            )
            .unwrap();
        (temp, store, owner.id)
    }

    #[test]
    fn test_create_nested_space() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();

        let acme = store.create_space(&ctx, &NewSpace::root("acme", owner)).unwrap();
        let infra = store
            .create_space(&ctx, &NewSpace::child(acme.id, "infra", owner))
            .unwrap();

        assert_eq!(acme.path, "/acme");
        assert_eq!(infra.path, "/acme/infra");
        assert_eq!(infra.parent_id, Some(acme.id));
        assert_eq!(store.count_child_spaces(&ctx, acme.id).unwrap(), 1);
        assert_eq!(
            store.list_space_ancestors(&ctx, infra.id).unwrap(),
            vec![infra.id, acme.id]
        );
    }

    #[test]
    fn test_create_space_under_missing_parent() {
        let (_temp, store, owner) = setup();
        let err = store
            .create_space(&Context::background(), &NewSpace::child(42, "orphan", owner))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_duplicate_space_path_conflicts() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        store.create_space(&ctx, &NewSpace::root("acme", owner)).unwrap();

        let err = store.create_space(&ctx, &NewSpace::root("acme", owner)).unwrap_err();
        assert!(err.is_conflict());

        let rows: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM spaces", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1, "the losing insert must be rolled back");
    }

    #[test]
    fn test_move_to_same_location_is_noop() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        let acme = store.create_space(&ctx, &NewSpace::root("acme", owner)).unwrap();

        let moved = store.move_space(&ctx, owner, acme.id, None, "acme", true).unwrap();
        assert_eq!(moved.path, "/acme");

        let paths = store
            .list_paths(&ctx, ResourceRef::space(acme.id), &PathFilter::default())
            .unwrap();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_move_back_onto_own_alias() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        let acme = store.create_space(&ctx, &NewSpace::root("acme", owner)).unwrap();

        store.move_space(&ctx, owner, acme.id, None, "acme-corp", true).unwrap();
        let back = store.move_space(&ctx, owner, acme.id, None, "acme", true).unwrap();

        assert_eq!(back.path, "/acme");
        let paths = store
            .list_paths(&ctx, ResourceRef::space(acme.id), &PathFilter::default())
            .unwrap();
        let values: Vec<_> = paths.iter().map(|p| (p.value.as_str(), p.is_primary)).collect();
        assert_eq!(values, vec![("/acme", true), ("/acme-corp", false)]);
    }

    #[test]
    fn test_move_rewrites_descendant_paths() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        let acme = store.create_space(&ctx, &NewSpace::root("acme", owner)).unwrap();
        let infra = store
            .create_space(&ctx, &NewSpace::child(acme.id, "infra", owner))
            .unwrap();
        let repo = store
            .create_repo(&ctx, &NewRepository::new(infra.id, "terraform", owner))
            .unwrap();

        store.move_space(&ctx, owner, acme.id, None, "acme-corp", false).unwrap();

        assert_eq!(store.find_space(&ctx, infra.id).unwrap().path, "/acme-corp/infra");
        assert_eq!(
            store.find_repo(&ctx, repo.id).unwrap().path,
            "/acme-corp/infra/terraform"
        );
        assert!(store.resolve(&ctx, "/acme/infra/terraform").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_requires_empty_space() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        let acme = store.create_space(&ctx, &NewSpace::root("acme", owner)).unwrap();
        let infra = store
            .create_space(&ctx, &NewSpace::child(acme.id, "infra", owner))
            .unwrap();

        assert!(store.delete_space(&ctx, acme.id).unwrap_err().is_conflict());

        store.delete_space(&ctx, infra.id).unwrap();
        store.delete_space(&ctx, acme.id).unwrap();
        assert!(store.resolve(&ctx, "/acme").unwrap_err().is_not_found());
        assert!(store.delete_space(&ctx, acme.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_children_filters_and_sorts() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        let acme = store.create_space(&ctx, &NewSpace::root("acme", owner)).unwrap();
        for uid in ["web", "backend", "web-legacy", "data"] {
            store.create_space(&ctx, &NewSpace::child(acme.id, uid, owner)).unwrap();
        }

        let filter = ResourceFilter {
            query: "WEB".to_string(),
            order: crate::types::Order::Desc,
            ..Default::default()
        };
        let spaces = store.list_child_spaces(&ctx, acme.id, &filter).unwrap();
        let uids: Vec<_> = spaces.iter().map(|s| s.uid.as_str()).collect();
        assert_eq!(uids, vec!["web-legacy", "web"]);

        let page = ResourceFilter {
            page: 2,
            size: 3,
            ..Default::default()
        };
        let spaces = store.list_child_spaces(&ctx, acme.id, &page).unwrap();
        assert_eq!(spaces.len(), 1);
        assert_eq!(spaces[0].uid, "web-legacy");
    }

    #[test]
    fn test_update_space_refreshes_timestamp() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        let mut acme = store.create_space(&ctx, &NewSpace::root("acme", owner)).unwrap();

        acme.display_name = "ACME Inc.".to_string();
        acme.description = "Everything".to_string();
        let updated = store.update_space(&ctx, &acme).unwrap();

        assert_eq!(updated.display_name, "ACME Inc.");
        assert!(updated.updated >= acme.created);
        assert_eq!(updated.path, "/acme");
    }
}
