use rusqlite::{Row, params, params_from_iter};
use tracing::info;

use super::{SqliteStore, format_datetime, now, parse_datetime, placeholders};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::store::PrincipalStore;
use crate::types::{NewPrincipal, Principal, PrincipalInfo};

const PRINCIPAL_COLUMNS: &str = "principal_id, principal_uid, principal_kind, principal_display_name,
     principal_email, principal_created, principal_updated";

fn principal_from_row(row: &Row<'_>) -> rusqlite::Result<Principal> {
    Ok(Principal {
        id: row.get(0)?,
        uid: row.get(1)?,
        kind: row.get(2)?,
        display_name: row.get(3)?,
        email: row.get(4)?,
        created: parse_datetime(&row.get::<_, String>(5)?),
        updated: parse_datetime(&row.get::<_, String>(6)?),
    })
}

impl PrincipalStore for SqliteStore {
    fn create_principal(&self, ctx: &Context, principal: &NewPrincipal) -> Result<Principal> {
        if principal.uid.trim().is_empty() {
            return Err(Error::BadRequest("principal uid must not be empty".to_string()));
        }

        self.write(ctx, |tx| {
            let at = now();
            tx.execute(
                "INSERT INTO principals (principal_uid, principal_kind, principal_display_name,
                 principal_email, principal_created, principal_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    principal.uid,
                    principal.kind,
                    principal.display_name,
                    principal.email,
                    format_datetime(&at),
                ],
            )
            .map_err(|e| match Error::from(e) {
                Error::Conflict(_) => {
                    Error::Conflict(format!("principal '{}' already exists", principal.uid))
                }
                other => other,
            })?;

            Ok(Principal {
                id: tx.last_insert_rowid(),
                uid: principal.uid.clone(),
                kind: principal.kind,
                display_name: principal.display_name.clone(),
                email: principal.email.clone(),
                created: at,
                updated: at,
            })
        })
    }

    fn find_principal(&self, ctx: &Context, id: i64) -> Result<Principal> {
        self.read(ctx, |conn| {
            conn.query_row(
                &format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE principal_id = ?1"),
                params![id],
                principal_from_row,
            )
            .map_err(Error::from)
        })
    }

    fn find_principal_infos(&self, ctx: &Context, ids: &[i64]) -> Result<Vec<PrincipalInfo>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.read(ctx, |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE principal_id IN ({})",
                placeholders(ids.len())
            ))?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), principal_from_row)?;

            let mut infos = Vec::with_capacity(ids.len());
            for row in rows {
                infos.push(PrincipalInfo::from(&row?));
            }
            Ok(infos)
        })
    }

    fn delete_principal(&self, ctx: &Context, id: i64) -> Result<()> {
        self.write(ctx, |tx| {
            let memberships = tx.execute(
                "DELETE FROM memberships WHERE membership_principal_id = ?1",
                params![id],
            )?;
            let rows = tx.execute("DELETE FROM principals WHERE principal_id = ?1", params![id])?;
            if rows == 0 {
                return Err(Error::NotFound);
            }

            info!(principal_id = id, memberships, "Deleted principal");
            Ok(())
        })
    }
}
