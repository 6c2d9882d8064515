mod membership;
mod paths;
mod principal;
mod repo;
mod space;

pub use membership::SqliteMembershipStore;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, TransactionBehavior};

use super::schema::SCHEMA;
use crate::config::StoreConfig;
use crate::context::Context;
use crate::error::Result;

/// VM instructions between two polls of the caller's context.
const PROGRESS_OPS: i32 = 256;

/// How long a caller waits for the connection before re-checking its context.
const LOCK_POLL: Duration = Duration::from_millis(10);

pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: StoreConfig,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_config(db_path, StoreConfig::default())
    }

    /// Opens the database under `config.data_dir`, creating the directory if needed.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;
        Self::with_config(config.db_path(), config.clone())
    }

    pub fn with_config<P: AsRef<Path>>(db_path: P, config: StoreConfig) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(config.busy_timeout())?;
        register_functions(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Waits for the connection only as long as `ctx` allows.
    fn conn_for(&self, ctx: &Context) -> Result<MutexGuard<'_, Connection>> {
        loop {
            ctx.check()?;
            let wait = ctx.remaining().map_or(LOCK_POLL, |left| left.min(LOCK_POLL));
            if let Some(guard) = self.conn.try_lock_for(wait) {
                return Ok(guard);
            }
        }
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn()
    }

    /// Bounds lock waits by the caller's deadline and lets `ctx` interrupt
    /// running statements.
    fn arm(&self, conn: &Connection, ctx: &Context) -> Result<()> {
        let busy = self.config.busy_timeout();
        // SQLite counts whole milliseconds; round up so a lock wait cut short
        // by the deadline ends after it.
        let wait = ctx
            .remaining()
            .map_or(busy, |left| (left + Duration::from_millis(1)).min(busy));
        conn.busy_timeout(wait)?;
        conn.progress_handler(PROGRESS_OPS, Some(ctx.probe()));
        Ok(())
    }

    fn disarm(&self, conn: &Connection) {
        conn.progress_handler(0, None::<fn() -> bool>);
        if let Err(e) = conn.busy_timeout(self.config.busy_timeout()) {
            tracing::warn!("Failed to restore busy timeout: {e}");
        }
    }

    /// Runs `f` against the connection with the context armed as an
    /// interrupt source.
    pub(crate) fn read<T>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let conn = self.conn_for(ctx)?;

        let result = self.arm(&conn, ctx).and_then(|()| f(&conn));
        self.disarm(&conn);

        result.map_err(|e| ctx.refine(e))
    }

    /// Runs `f` inside an immediate transaction; any error rolls back every
    /// write `f` made.
    pub(crate) fn write<T>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn_for(ctx)?;

        let result = match self.arm(&conn, ctx) {
            Ok(()) => in_transaction(&mut conn, f),
            Err(e) => Err(e),
        };
        self.disarm(&conn);

        result.map_err(|e| ctx.refine(e))
    }
}

fn in_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::warn!("Failed to roll back transaction: {rollback_err}");
            }
            Err(err)
        }
    }
}

/// SQL helpers the queries rely on. `fold_case` lowercases with full Unicode
/// rules, where the built-in `LOWER` and `LIKE` only fold ASCII.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )?;
    Ok(())
}

/// Current time at the precision timestamps are stored with.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::warn!("Invalid datetime in database: '{}' - {}", s, e);
            DateTime::<Utc>::default()
        })
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Case-folded LIKE pattern matching `term` literally anywhere; compare it
/// against `fold_case(column)` with `ESCAPE '\'`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    fn open_store(temp: &TempDir) -> SqliteStore {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        store
    }

    const ENDLESS_QUERY: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                                 SELECT count(*) FROM c";

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in ["memberships", "paths", "principals", "repositories", "spaces"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_deadline_interrupts_running_statement() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let ctx = Context::with_timeout(Duration::from_millis(50));

        let result = store.read(&ctx, |conn| {
            Ok(conn.query_row(ENDLESS_QUERY, [], |row| row.get::<_, i64>(0))?)
        });

        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[test]
    fn test_cancel_interrupts_running_statement() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let ctx = Context::background();

        let canceller = ctx.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let result = store.read(&ctx, |conn| {
            Ok(conn.query_row(ENDLESS_QUERY, [], |row| row.get::<_, i64>(0))?)
        });
        handle.join().unwrap();

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let ctx = Context::background();

        let result: Result<()> = store.write(&ctx, |tx| {
            tx.execute(
                "INSERT INTO principals (principal_uid, principal_kind, principal_display_name,
                 principal_email, principal_created, principal_updated)
                 VALUES ('ghost', 'user', 'Ghost', '', '', '')",
                [],
            )?;
            Err(Error::Conflict("forced".to_string()))
        });
        assert!(matches!(result, Err(Error::Conflict(_))));

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM principals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        // The connection is usable for the next transaction.
        store.write(&ctx, |_| Ok(())).unwrap();
    }

    #[test]
    fn test_deadline_bounds_wait_for_locked_database() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let other = SqliteStore::new(temp.path().join("test.db")).unwrap();
        other.conn().execute_batch("BEGIN IMMEDIATE").unwrap();

        let started = std::time::Instant::now();
        let result = store.write(&Context::with_timeout(Duration::from_millis(50)), |_| Ok(()));

        assert!(matches!(result, Err(Error::Timeout)), "got {result:?}");
        assert!(started.elapsed() < Duration::from_secs(2));

        other.conn().execute_batch("ROLLBACK").unwrap();
        store.write(&Context::background(), |_| Ok(())).unwrap();
    }

    #[test]
    fn test_deadline_bounds_wait_for_connection() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let held = store.connection();

        let result = store.read(&Context::with_timeout(Duration::from_millis(50)), |_| Ok(()));
        assert!(matches!(result, Err(Error::Timeout)));

        drop(held);
        store.read(&Context::background(), |_| Ok(())).unwrap();
    }

    #[test]
    fn test_fold_case_lowers_unicode() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let folded: String = store
            .conn()
            .query_row("SELECT fold_case('ÉMILE Zola')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, "émile zola");

        let matched: bool = store
            .conn()
            .query_row(
                "SELECT fold_case('ÉMILE Zola') LIKE ? ESCAPE '\\'",
                [like_pattern("Émile")],
                |row| row.get(0),
            )
            .unwrap();
        assert!(matched);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Ann"), "%ann%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_datetime_round_trip_keeps_micros() {
        let ts = now();
        assert_eq!(parse_datetime(&format_datetime(&ts)), ts);
    }
}
