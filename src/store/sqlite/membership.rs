use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Duration;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};
use tracing::debug;

use super::space::{SPACE_COLUMNS, SPACE_FROM, ancestor_ids, space_from_row};
use super::{SqliteStore, format_datetime, like_pattern, now, parse_datetime, placeholders};
use crate::cache::PrincipalInfoCache;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::store::MembershipStore;
use crate::types::{
    Membership, MembershipFilter, MembershipKey, MembershipRole, MembershipSort, MembershipSpace,
    MembershipUser, PrincipalInfo,
};

const MEMBERSHIP_COLUMNS: &str = "m.membership_space_id, m.membership_principal_id, m.membership_role,
     m.membership_created_by, m.membership_created, m.membership_updated";

/// Number of columns in `MEMBERSHIP_COLUMNS`; joined columns start here.
const MEMBERSHIP_WIDTH: usize = 6;

const GRANTEE_COLUMNS: &str = "pr.principal_uid, pr.principal_display_name, pr.principal_email,
     pr.principal_kind";

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
    Ok(Membership {
        key: MembershipKey::new(row.get(0)?, row.get(1)?),
        role: row.get(2)?,
        created_by: row.get(3)?,
        created: parse_datetime(&row.get::<_, String>(4)?),
        updated: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn grantee_from_row(row: &Row<'_>, id: i64) -> rusqlite::Result<PrincipalInfo> {
    Ok(PrincipalInfo {
        id,
        uid: row.get(MEMBERSHIP_WIDTH)?,
        display_name: row.get(MEMBERSHIP_WIDTH + 1)?,
        email: row.get(MEMBERSHIP_WIDTH + 2)?,
        kind: Some(row.get(MEMBERSHIP_WIDTH + 3)?),
    })
}

fn find_in(conn: &Connection, key: MembershipKey) -> Result<Membership> {
    conn.query_row(
        &format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships m
             WHERE m.membership_space_id = ?1 AND m.membership_principal_id = ?2"
        ),
        params![key.space_id, key.principal_id],
        membership_from_row,
    )
    .map_err(Error::from)
}

/// Inserts a membership row inside the caller's transaction.
pub(super) fn insert(conn: &Connection, m: &Membership) -> Result<()> {
    conn.execute(
        "INSERT INTO memberships (membership_space_id, membership_principal_id,
         membership_created_by, membership_created, membership_updated, membership_role)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            m.key.space_id,
            m.key.principal_id,
            m.created_by,
            format_datetime(&m.created),
            format_datetime(&m.updated),
            m.role,
        ],
    )
    .map_err(|e| match Error::from(e) {
        Error::Conflict(_) => Error::Conflict(format!(
            "principal {} is already a member of space {}",
            m.key.principal_id, m.key.space_id
        )),
        other => other,
    })?;
    Ok(())
}

fn filter_clause(space_id: i64, filter: &MembershipFilter) -> (String, Vec<Value>) {
    let mut clause = String::from("WHERE m.membership_space_id = ?");
    let mut args = vec![Value::Integer(space_id)];

    if !filter.query.is_empty() {
        clause.push_str(" AND fold_case(pr.principal_display_name) LIKE ? ESCAPE '\\'");
        args.push(Value::Text(like_pattern(&filter.query)));
    }
    (clause, args)
}

fn order_clause(filter: &MembershipFilter) -> String {
    let order = filter.order.as_sql();
    match filter.sort {
        MembershipSort::Name => {
            format!("ORDER BY pr.principal_display_name {order}, m.membership_principal_id ASC")
        }
        MembershipSort::Created => {
            format!("ORDER BY m.membership_created {order}, m.membership_principal_id ASC")
        }
        MembershipSort::None => "ORDER BY m.membership_principal_id ASC".to_string(),
    }
}

/// Membership store that enriches rows with principal info from a cache.
pub struct SqliteMembershipStore {
    store: Arc<SqliteStore>,
    cache: Arc<dyn PrincipalInfoCache>,
}

impl SqliteMembershipStore {
    pub fn new(store: Arc<SqliteStore>, cache: Arc<dyn PrincipalInfoCache>) -> Self {
        Self { store, cache }
    }

    /// Resolves every distinct granter of `memberships` with a single cache lookup.
    fn granters<'a>(
        &self,
        ctx: &Context,
        memberships: impl Iterator<Item = &'a Membership>,
    ) -> Result<HashMap<i64, PrincipalInfo>> {
        let ids: Vec<i64> = memberships
            .map(|m| m.created_by)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.cache.map(ctx, &ids)
    }
}

impl MembershipStore for SqliteMembershipStore {
    fn find(&self, ctx: &Context, key: MembershipKey) -> Result<Membership> {
        self.store.read(ctx, |conn| find_in(conn, key))
    }

    fn find_user(&self, ctx: &Context, key: MembershipKey) -> Result<MembershipUser> {
        let membership = self.find(ctx, key)?;

        let mut infos = self
            .cache
            .map(ctx, &[membership.key.principal_id, membership.created_by])?;

        let principal = infos.get(&key.principal_id).cloned().ok_or_else(|| {
            Error::DataIntegrity(format!(
                "member {} of space {} has no principal",
                key.principal_id, key.space_id
            ))
        })?;
        let added_by = infos.remove(&membership.created_by).unwrap_or_default();

        Ok(MembershipUser {
            membership,
            principal,
            added_by,
        })
    }

    fn create(&self, ctx: &Context, membership: &Membership) -> Result<()> {
        self.store.write(ctx, |tx| insert(tx, membership))?;
        debug!(
            space_id = membership.key.space_id,
            principal_id = membership.key.principal_id,
            role = %membership.role,
            "created membership"
        );
        Ok(())
    }

    fn update(&self, ctx: &Context, membership: &mut Membership) -> Result<()> {
        let updated = now().max(membership.updated + Duration::microseconds(1));

        self.store.write(ctx, |tx| {
            let rows = tx.execute(
                "UPDATE memberships SET membership_role = ?1, membership_updated = ?2
                 WHERE membership_space_id = ?3 AND membership_principal_id = ?4",
                params![
                    membership.role,
                    format_datetime(&updated),
                    membership.key.space_id,
                    membership.key.principal_id,
                ],
            )?;

            if rows == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })?;

        membership.updated = updated;
        Ok(())
    }

    fn delete(&self, ctx: &Context, key: MembershipKey) -> Result<()> {
        self.store.write(ctx, |tx| {
            tx.execute(
                "DELETE FROM memberships
                 WHERE membership_space_id = ?1 AND membership_principal_id = ?2",
                params![key.space_id, key.principal_id],
            )?;
            Ok(())
        })
    }

    fn count_users(&self, ctx: &Context, space_id: i64, filter: &MembershipFilter) -> Result<i64> {
        let (clause, args) = filter_clause(space_id, filter);
        let sql = format!(
            "SELECT COUNT(*) FROM memberships m
             JOIN principals pr ON pr.principal_id = m.membership_principal_id
             {clause}"
        );

        self.store.read(ctx, |conn| {
            Ok(conn.query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?)
        })
    }

    fn list_users(
        &self,
        ctx: &Context,
        space_id: i64,
        filter: &MembershipFilter,
    ) -> Result<Vec<MembershipUser>> {
        let config = self.store.config();
        let (clause, mut args) = filter_clause(space_id, filter);
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS}, {GRANTEE_COLUMNS} FROM memberships m
             JOIN principals pr ON pr.principal_id = m.membership_principal_id
             {clause} {} LIMIT ? OFFSET ?",
            order_clause(filter)
        );
        args.push(Value::Integer(i64::from(config.limit(filter.size))));
        args.push(Value::Integer(config.offset(filter.page, filter.size) as i64));

        let rows = self.store.read(ctx, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
                let membership = membership_from_row(row)?;
                let principal = grantee_from_row(row, membership.key.principal_id)?;
                Ok((membership, principal))
            })?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })?;

        let granters = self.granters(ctx, rows.iter().map(|(m, _)| m))?;

        Ok(rows
            .into_iter()
            .map(|(membership, principal)| MembershipUser {
                added_by: granters
                    .get(&membership.created_by)
                    .cloned()
                    .unwrap_or_default(),
                membership,
                principal,
            })
            .collect())
    }

    fn list_spaces(&self, ctx: &Context, principal_id: i64) -> Result<Vec<MembershipSpace>> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS}, {SPACE_COLUMNS} FROM {SPACE_FROM}
             JOIN memberships m ON m.membership_space_id = s.space_id
             WHERE m.membership_principal_id = ?1
             ORDER BY p.path_value ASC"
        );

        let rows = self.store.read(ctx, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![principal_id], |row| {
                Ok((membership_from_row(row)?, space_from_row(row, MEMBERSHIP_WIDTH)?))
            })?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })?;

        let granters = self.granters(ctx, rows.iter().map(|(m, _)| m))?;

        Ok(rows
            .into_iter()
            .map(|(membership, space)| MembershipSpace {
                added_by: granters
                    .get(&membership.created_by)
                    .cloned()
                    .unwrap_or_default(),
                membership,
                space,
            })
            .collect())
    }

    fn find_effective_role(
        &self,
        ctx: &Context,
        space_id: i64,
        principal_id: i64,
    ) -> Result<Option<MembershipRole>> {
        let max_depth = self.store.config().max_space_depth;

        self.store.read(ctx, |conn| {
            let chain = ancestor_ids(conn, space_id, max_depth)?;

            let mut stmt = conn.prepare(&format!(
                "SELECT membership_role FROM memberships
                 WHERE membership_principal_id = ? AND membership_space_id IN ({})",
                placeholders(chain.len())
            ))?;
            let args = std::iter::once(principal_id).chain(chain.iter().copied());
            let roles = stmt.query_map(params_from_iter(args), |row| {
                row.get::<_, MembershipRole>(0)
            })?;

            let mut best = None;
            for role in roles {
                best = best.max(Some(role?));
            }
            Ok(best)
        })
    }
}
