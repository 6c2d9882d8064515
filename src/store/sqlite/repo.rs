use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};
use tracing::info;

use super::{SqliteStore, format_datetime, like_pattern, now, parse_datetime, paths};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::store::path::join_path;
use crate::store::{PathStore, RepoStore};
use crate::types::{NewRepository, Repository, ResourceFilter, ResourceKind, ResourceRef, ResourceSort};

const REPO_COLUMNS: &str = "r.repo_id, r.repo_parent_id, r.repo_uid, r.repo_description,
     r.repo_created_by, r.repo_created, r.repo_updated, p.path_value";

const REPO_FROM: &str = "repositories r
     JOIN paths p ON p.path_target_kind = 'repo' AND p.path_target_id = r.repo_id
                 AND p.path_is_primary = 1";

fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        uid: row.get(2)?,
        description: row.get(3)?,
        created_by: row.get(4)?,
        created: parse_datetime(&row.get::<_, String>(5)?),
        updated: parse_datetime(&row.get::<_, String>(6)?),
        path: row.get(7)?,
    })
}

fn find_in(conn: &Connection, id: i64) -> Result<Repository> {
    conn.query_row(
        &format!("SELECT {REPO_COLUMNS} FROM {REPO_FROM} WHERE r.repo_id = ?1"),
        params![id],
        repo_from_row,
    )
    .map_err(Error::from)
}

fn sort_column(sort: ResourceSort) -> &'static str {
    match sort {
        ResourceSort::Uid => "r.repo_uid",
        ResourceSort::Path => "p.path_value",
        ResourceSort::Created => "r.repo_created",
        ResourceSort::Updated => "r.repo_updated",
    }
}

impl RepoStore for SqliteStore {
    fn find_repo(&self, ctx: &Context, id: i64) -> Result<Repository> {
        self.read(ctx, |conn| find_in(conn, id))
    }

    fn find_repo_by_path(&self, ctx: &Context, path: &str) -> Result<Repository> {
        let target = self.resolve(ctx, path)?;
        if target.kind != ResourceKind::Repository {
            return Err(Error::NotFound);
        }
        self.find_repo(ctx, target.id)
    }

    fn create_repo(&self, ctx: &Context, repo: &NewRepository) -> Result<Repository> {
        self.write(ctx, |tx| {
            let parent = paths::find_primary(tx, ResourceRef::space(repo.parent_id))?;
            let value = join_path(Some(&parent.value), &repo.uid)?;

            let at = now();
            tx.execute(
                "INSERT INTO repositories (repo_parent_id, repo_uid, repo_description,
                 repo_created_by, repo_created, repo_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    repo.parent_id,
                    repo.uid,
                    repo.description,
                    repo.created_by,
                    format_datetime(&at),
                ],
            )?;
            let id = tx.last_insert_rowid();

            paths::insert(tx, ResourceRef::repo(id), &value, true, repo.created_by, at)?;
            find_in(tx, id)
        })
    }

    fn move_repo(
        &self,
        ctx: &Context,
        principal_id: i64,
        repo_id: i64,
        new_space_id: i64,
        new_uid: &str,
        keep_as_alias: bool,
    ) -> Result<Repository> {
        self.write(ctx, |tx| {
            let target = ResourceRef::repo(repo_id);
            let current = paths::find_primary(tx, target)?;
            let parent = paths::find_primary(tx, ResourceRef::space(new_space_id))?;
            let new_value = join_path(Some(&parent.value), new_uid)?;

            let at = now();
            let primary =
                paths::repoint_primary(tx, target, &new_value, keep_as_alias, principal_id, at)?;

            let rows = tx.execute(
                "UPDATE repositories SET repo_parent_id = ?1, repo_uid = ?2, repo_updated = ?3
                 WHERE repo_id = ?4",
                params![new_space_id, new_uid, format_datetime(&at), repo_id],
            )?;
            if rows == 0 {
                return Err(Error::NotFound);
            }

            info!(
                repo_id,
                from = %current.value,
                to = %primary.value,
                keep_as_alias,
                "Moved repository"
            );
            find_in(tx, repo_id)
        })
    }

    fn update_repo(&self, ctx: &Context, repo: &Repository) -> Result<Repository> {
        self.write(ctx, |tx| {
            let rows = tx.execute(
                "UPDATE repositories SET repo_description = ?1, repo_updated = ?2 WHERE repo_id = ?3",
                params![repo.description, format_datetime(&now()), repo.id],
            )?;

            if rows == 0 {
                return Err(Error::NotFound);
            }
            find_in(tx, repo.id)
        })
    }

    fn delete_repo(&self, ctx: &Context, id: i64) -> Result<()> {
        self.write(ctx, |tx| {
            let removed_paths = paths::delete_all(tx, ResourceRef::repo(id))?;
            let rows = tx.execute("DELETE FROM repositories WHERE repo_id = ?1", params![id])?;
            if rows == 0 {
                return Err(Error::NotFound);
            }

            info!(repo_id = id, removed_paths, "Deleted repository");
            Ok(())
        })
    }

    fn count_repos(&self, ctx: &Context, space_id: i64) -> Result<i64> {
        self.read(ctx, |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM repositories WHERE repo_parent_id = ?1",
                params![space_id],
                |row| row.get(0),
            )?)
        })
    }

    fn list_repos(
        &self,
        ctx: &Context,
        space_id: i64,
        filter: &ResourceFilter,
    ) -> Result<Vec<Repository>> {
        let mut sql = format!("SELECT {REPO_COLUMNS} FROM {REPO_FROM} WHERE r.repo_parent_id = ?");
        let mut args = vec![Value::Integer(space_id)];

        if !filter.query.is_empty() {
            sql.push_str(" AND fold_case(r.repo_uid) LIKE ? ESCAPE '\\'");
            args.push(Value::Text(like_pattern(&filter.query)));
        }

        sql.push_str(&format!(
            " ORDER BY {} {}, r.repo_id ASC LIMIT ? OFFSET ?",
            sort_column(filter.sort),
            filter.order.as_sql()
        ));
        args.push(Value::Integer(i64::from(self.config().limit(filter.size))));
        args.push(Value::Integer(self.config().offset(filter.page, filter.size) as i64));

        self.read(ctx, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), repo_from_row)?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
    }
}
