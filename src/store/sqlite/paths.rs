use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use super::{SqliteStore, format_datetime, now, parse_datetime};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::store::PathStore;
use crate::store::path::{normalize_path, strip_ancestor};
use crate::types::{Path, PathFilter, ResourceKind, ResourceRef};

const PATH_COLUMNS: &str = "path_id, path_value, path_is_primary, path_target_kind, path_target_id,
     path_created_by, path_created, path_updated";

fn path_from_row(row: &Row<'_>) -> rusqlite::Result<Path> {
    Ok(Path {
        id: row.get(0)?,
        value: row.get(1)?,
        is_primary: row.get(2)?,
        target: ResourceRef {
            kind: row.get(3)?,
            id: row.get(4)?,
        },
        created_by: row.get(5)?,
        created: parse_datetime(&row.get::<_, String>(6)?),
        updated: parse_datetime(&row.get::<_, String>(7)?),
    })
}

pub(super) fn find_by_value(conn: &Connection, value: &str) -> Result<Option<Path>> {
    conn.query_row(
        &format!("SELECT {PATH_COLUMNS} FROM paths WHERE path_value = ?1"),
        params![value],
        path_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Path>> {
    conn.query_row(
        &format!("SELECT {PATH_COLUMNS} FROM paths WHERE path_id = ?1"),
        params![id],
        path_from_row,
    )
    .optional()
    .map_err(Error::from)
}

/// Primary path of `target`; `NotFound` when the resource has none.
pub(super) fn find_primary(conn: &Connection, target: ResourceRef) -> Result<Path> {
    conn.query_row(
        &format!(
            "SELECT {PATH_COLUMNS} FROM paths
             WHERE path_target_kind = ?1 AND path_target_id = ?2 AND path_is_primary = 1"
        ),
        params![target.kind, target.id],
        path_from_row,
    )
    .map_err(Error::from)
}

pub(super) fn resource_exists(conn: &Connection, target: ResourceRef) -> Result<bool> {
    let sql = match target.kind {
        ResourceKind::Space => "SELECT EXISTS(SELECT 1 FROM spaces WHERE space_id = ?1)",
        ResourceKind::Repository => {
            "SELECT EXISTS(SELECT 1 FROM repositories WHERE repo_id = ?1)"
        }
    };
    Ok(conn.query_row(sql, params![target.id], |row| row.get(0))?)
}

/// Inserts a path row. The value must already be normalized.
pub(super) fn insert(
    conn: &Connection,
    target: ResourceRef,
    value: &str,
    is_primary: bool,
    created_by: i64,
    at: DateTime<Utc>,
) -> Result<Path> {
    if let Some(existing) = find_by_value(conn, value)? {
        return Err(Error::Conflict(format!(
            "path '{value}' is already taken by {}",
            existing.target
        )));
    }

    let ts = format_datetime(&at);
    conn.execute(
        "INSERT INTO paths (path_value, path_is_primary, path_target_kind, path_target_id,
         path_created_by, path_created, path_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![value, is_primary, target.kind, target.id, created_by, ts],
    )
    .map_err(|e| match Error::from(e) {
        Error::Conflict(_) => Error::Conflict(format!("path '{value}' is already taken")),
        other => other,
    })?;

    Ok(Path {
        id: conn.last_insert_rowid(),
        value: value.to_string(),
        is_primary,
        target,
        created_by,
        created: at,
        updated: at,
    })
}

pub(super) fn delete_all(conn: &Connection, target: ResourceRef) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM paths WHERE path_target_kind = ?1 AND path_target_id = ?2",
        params![target.kind, target.id],
    )?)
}

/// Makes `new_value` the primary path of `target`. The previous primary
/// survives as an alias when `keep_as_alias` is set and is deleted otherwise.
/// An alias of `target` that already holds `new_value` is promoted in place of
/// a fresh row; any other owner of `new_value` is a conflict.
pub(super) fn repoint_primary(
    conn: &Connection,
    target: ResourceRef,
    new_value: &str,
    keep_as_alias: bool,
    created_by: i64,
    at: DateTime<Utc>,
) -> Result<Path> {
    let old = find_primary(conn, target)?;
    if old.value == new_value {
        return Ok(old);
    }

    if let Some(existing) = find_by_value(conn, new_value)? {
        if existing.target != target {
            return Err(Error::Conflict(format!(
                "path '{new_value}' is already taken"
            )));
        }
        conn.execute("DELETE FROM paths WHERE path_id = ?1", params![existing.id])?;
    }

    // The old primary must step down first: at most one primary per resource
    // is enforced by a partial unique index.
    if keep_as_alias {
        conn.execute(
            "UPDATE paths SET path_is_primary = 0, path_updated = ?1 WHERE path_id = ?2",
            params![format_datetime(&at), old.id],
        )?;
    } else {
        conn.execute("DELETE FROM paths WHERE path_id = ?1", params![old.id])?;
    }

    let new = insert(conn, target, new_value, true, created_by, at)?;
    debug!(
        resource = %target,
        from = %old.value,
        to = %new.value,
        keep_as_alias,
        "repointed primary path"
    );
    Ok(new)
}

/// Re-prefixes the primary path of every resource below `old_prefix`.
/// Returns how many resources were repointed.
pub(super) fn repoint_descendants(
    conn: &Connection,
    old_prefix: &str,
    new_prefix: &str,
    keep_as_alias: bool,
    created_by: i64,
    at: DateTime<Utc>,
) -> Result<usize> {
    let below = format!("{old_prefix}/");
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATH_COLUMNS} FROM paths
         WHERE path_is_primary = 1 AND substr(path_value, 1, length(?1)) = ?1
         ORDER BY path_value"
    ))?;
    let descendants = stmt
        .query_map(params![below], path_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for path in &descendants {
        let Some(rest) = strip_ancestor(&path.value, old_prefix) else {
            continue;
        };
        let new_value = format!("{new_prefix}{rest}");
        repoint_primary(conn, path.target, &new_value, keep_as_alias, created_by, at)?;
    }

    Ok(descendants.len())
}

impl PathStore for SqliteStore {
    fn resolve(&self, ctx: &Context, path: &str) -> Result<ResourceRef> {
        let value = normalize_path(path)?;
        self.read(ctx, |conn| {
            find_by_value(conn, &value)?
                .map(|p| p.target)
                .ok_or(Error::NotFound)
        })
    }

    fn find_primary_path(&self, ctx: &Context, resource: ResourceRef) -> Result<Path> {
        self.read(ctx, |conn| find_primary(conn, resource))
    }

    fn create_path(
        &self,
        ctx: &Context,
        resource: ResourceRef,
        value: &str,
        is_primary: bool,
        created_by: i64,
    ) -> Result<Path> {
        let value = normalize_path(value)?;
        self.write(ctx, |tx| {
            if !resource_exists(tx, resource)? {
                return Err(Error::NotFound);
            }
            if is_primary {
                let current = find_primary(tx, resource).map(Some).or_else(|e| match e {
                    Error::NotFound => Ok(None),
                    other => Err(other),
                })?;
                if current.is_some() {
                    return Err(Error::Conflict(format!(
                        "{resource} already has a primary path"
                    )));
                }
            }
            insert(tx, resource, &value, is_primary, created_by, now())
        })
    }

    fn list_paths(
        &self,
        ctx: &Context,
        resource: ResourceRef,
        filter: &PathFilter,
    ) -> Result<Vec<Path>> {
        let limit = self.config().limit(filter.size);
        let offset = self.config().offset(filter.page, filter.size);
        self.read(ctx, |conn| {
            find_primary(conn, resource)?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {PATH_COLUMNS} FROM paths
                 WHERE path_target_kind = ?1 AND path_target_id = ?2
                 ORDER BY path_is_primary DESC, path_created ASC, path_id ASC
                 LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt.query_map(
                params![resource.kind, resource.id, limit, offset as i64],
                path_from_row,
            )?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
    }

    fn delete_path(&self, ctx: &Context, resource: ResourceRef, path_id: i64) -> Result<()> {
        self.write(ctx, |tx| {
            let path = find_by_id(tx, path_id)?
                .filter(|p| p.target == resource)
                .ok_or(Error::NotFound)?;

            if path.is_primary {
                return Err(Error::Conflict(
                    "cannot delete the primary path of a resource".to_string(),
                ));
            }

            tx.execute("DELETE FROM paths WHERE path_id = ?1", params![path.id])?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PrincipalStore, SpaceStore};
    use crate::types::{NewPrincipal, NewSpace, PrincipalKind};
    use tempfile::TempDir;

    fn setup() -> (TempDir, SqliteStore, i64) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        let owner = store
            .create_principal(
                &Context::background(),
                &NewPrincipal {
                    uid: "owner".to_string(),
                    kind: PrincipalKind::User,
                    display_name: "Owner".to_string(),
                    email: "owner@example.com".to_string(),
                },
            )
            .unwrap();
        (temp, store, owner.id)
    }

    fn space(store: &SqliteStore, owner: i64, uid: &str) -> ResourceRef {
        let s = store
            .create_space(&Context::background(), &NewSpace::root(uid, owner))
            .unwrap();
        ResourceRef::space(s.id)
    }

    #[test]
    fn test_resolve_normalizes_input() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        let acme = space(&store, owner, "acme");

        assert_eq!(store.resolve(&ctx, "acme").unwrap(), acme);
        assert_eq!(store.resolve(&ctx, "/acme/").unwrap(), acme);
        assert!(store.resolve(&ctx, "/other").unwrap_err().is_not_found());
    }

    #[test]
    fn test_alias_lists_after_primary() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        let acme = space(&store, owner, "acme");

        store.create_path(&ctx, acme, "/acme-legacy", false, owner).unwrap();
        store.create_path(&ctx, acme, "/acme-old", false, owner).unwrap();

        let paths = store.list_paths(&ctx, acme, &PathFilter::default()).unwrap();
        let values: Vec<_> = paths.iter().map(|p| p.value.as_str()).collect();
        assert_eq!(values, vec!["/acme", "/acme-legacy", "/acme-old"]);
        assert!(paths[0].is_primary);
        assert!(paths[1..].iter().all(|p| !p.is_primary));

        let page = store
            .list_paths(&ctx, acme, &PathFilter { page: 2, size: 2 })
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].value, "/acme-old");
    }

    #[test]
    fn test_create_path_is_globally_unique() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        let acme = space(&store, owner, "acme");
        let globex = space(&store, owner, "globex");

        let err = store.create_path(&ctx, globex, "/acme", false, owner).unwrap_err();
        assert!(err.is_conflict());

        let err = store.create_path(&ctx, acme, "/acme-2", true, owner).unwrap_err();
        assert!(err.is_conflict(), "second primary must be rejected");
    }

    #[test]
    fn test_create_path_for_missing_resource() {
        let (_temp, store, owner) = setup();
        let err = store
            .create_path(&Context::background(), ResourceRef::repo(99), "/x", false, owner)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_path_rules() {
        let (_temp, store, owner) = setup();
        let ctx = Context::background();
        let acme = space(&store, owner, "acme");
        let globex = space(&store, owner, "globex");
        let alias = store.create_path(&ctx, acme, "/acme-old", false, owner).unwrap();
        let primary = store.find_primary_path(&ctx, acme).unwrap();

        assert!(store.delete_path(&ctx, acme, primary.id).unwrap_err().is_conflict());
        assert!(store.delete_path(&ctx, globex, alias.id).unwrap_err().is_not_found());

        store.delete_path(&ctx, acme, alias.id).unwrap();
        assert!(store.resolve(&ctx, "/acme-old").unwrap_err().is_not_found());
        assert_eq!(store.resolve(&ctx, "/acme").unwrap(), acme);
    }
}
