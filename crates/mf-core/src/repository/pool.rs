//! Connection pool and migration runner.
//!
//! SQLite-only, unlike the teacher's dual sqlite/postgres `DbPool` enum —
//! this store has no deployment target that needs PostgreSQL, so the
//! `sea_query`/`pg_tls` cross-backend machinery was dropped (see
//! DESIGN.md). `diesel-async`'s `SyncConnectionWrapper` still gives every
//! caller the same async `RunQueryDsl` surface the teacher's code uses.

use cetane::migrator::MigrationStateStore;
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use tracing::info;

use crate::error::CoreError;

pub type AsyncSqliteConnection = SyncConnectionWrapper<SqliteConnection>;
pub type DbPool = Pool<AsyncSqliteConnection>;
pub type PooledConn = Object<AsyncSqliteConnection>;

/// Build a connection pool for a `sqlite:` URL or bare filesystem path.
pub fn build_pool(database_url: &str) -> Result<DbPool, CoreError> {
    let manager = AsyncDieselConnectionManager::<AsyncSqliteConnection>::new(database_url);
    Pool::builder(manager)
        .max_size(16)
        .build()
        .map_err(|e| CoreError::Pool(e.to_string()))
}

/// Apply pending migrations, blocking on a worker thread since cetane's
/// `Migrator` is synchronous.
pub async fn run_migrations(database_url: &str) -> Result<(), CoreError> {
    let url = database_url
        .strip_prefix("sqlite:")
        .unwrap_or(database_url)
        .to_string();

    tokio::task::spawn_blocking(move || {
        use cetane::backend::Sqlite;
        use cetane::migrator::Migrator;

        let conn = rusqlite::Connection::open(&url)
            .map_err(|e| CoreError::Migration(e.to_string()))?;
        let backend = Sqlite;
        let registry = crate::repository::migrations::registry();
        let mut state = SqliteMigrationState::new(&conn)?;

        let mut migrator = Migrator::new(&registry, &backend, state.clone_handle());
        let applied = migrator
            .migrate_forward(|sql| conn.execute_batch(sql).map_err(|e| e.to_string()))
            .map_err(|e| CoreError::Migration(e.to_string()))?;

        for name in &applied {
            info!(migration = %name, "applied migration");
        }
        if applied.is_empty() {
            info!("no pending migrations");
        }
        Ok(())
    })
    .await
    .map_err(|e| CoreError::Migration(e.to_string()))?
}

struct SqliteMigrationState<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> SqliteMigrationState<'a> {
    fn new(conn: &'a rusqlite::Connection) -> Result<Self, CoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS __cetane_migrations (
                name TEXT PRIMARY KEY NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .map_err(|e| CoreError::Migration(e.to_string()))?;
        Ok(Self { conn })
    }

    /// `Migrator::new` takes the state store by value; this type borrows a
    /// connection so it can't be `Clone`. We hand the migrator a fresh
    /// struct over the same connection instead of cloning.
    fn clone_handle(&self) -> SqliteMigrationState<'a> {
        SqliteMigrationState { conn: self.conn }
    }
}

impl MigrationStateStore for SqliteMigrationState<'_> {
    fn applied_migrations(&mut self) -> Result<Vec<String>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM __cetane_migrations ORDER BY name")
            .map_err(|e| e.to_string())?;
        stmt.query_map([], |row| row.get(0))
            .map_err(|e| e.to_string())?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| e.to_string())
    }

    fn mark_applied(&mut self, name: &str) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO __cetane_migrations (name) VALUES (?1)",
                [name],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn mark_unapplied(&mut self, name: &str) -> Result<(), String> {
        self.conn
            .execute("DELETE FROM __cetane_migrations WHERE name = ?1", [name])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

pub fn parse_datetime(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

pub fn parse_datetime_opt(s: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    s.as_deref().map(parse_datetime)
}
