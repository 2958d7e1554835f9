use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use crate::error::StoreError;
use crate::schema;

pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Pool sizing and lock behaviour for a file-backed database.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub pool_size: u32,
    /// How long SQLite retries a locked database before failing.
    pub busy_timeout_ms: u32,
    /// How long a caller waits for a free pooled connection.
    pub checkout_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 5_000,
            checkout_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(&schema::pragmas(self.busy_timeout_ms))
    }
}

/// Pooled SQLite connections.
///
/// A file database hands out up to `pool_size` connections in WAL mode, so
/// readers and writers on unrelated sessions do not queue behind each
/// other. An in-memory database lives inside a single connection, so its
/// pool holds exactly one and never recycles it.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
    path: PathBuf,
}

impl Database {
    /// Open or create a database file with the default pool settings.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, &DatabaseConfig::default())
    }

    /// Open or create a database file, creating parent directories as needed.
    pub fn open_with(path: &Path, config: &DatabaseConfig) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_timeout(config.checkout_timeout)
            .connection_customizer(Box::new(PragmaCustomizer {
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(SqliteConnectionManager::file(path))?;
        init(&*pool.get()?)?;

        info!(path = %path.display(), pool_size = pool.max_size(), "database opened");

        Ok(Self {
            pool,
            path: path.to_owned(),
        })
    }

    /// In-memory database, used by tests and `--db :memory:`.
    pub fn in_memory() -> Result<Self, StoreError> {
        let defaults = DatabaseConfig::default();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(defaults.checkout_timeout)
            .connection_customizer(Box::new(PragmaCustomizer {
                busy_timeout_ms: defaults.busy_timeout_ms,
            }))
            .build(SqliteConnectionManager::memory())?;
        init(&*pool.get()?)?;

        Ok(Self {
            pool,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Execute a closure with a pooled connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.pool.get()?;
        f(&conn)
    }

    /// Execute a closure inside an immediate transaction; rolled back unless
    /// the closure succeeds.
    ///
    /// Immediate mode takes the write lock up front, so a read-then-write
    /// body waits on `busy_timeout` instead of failing on upgrade.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool_size(&self) -> u32 {
        self.pool.max_size()
    }

    /// Cheap liveness probe for the health endpoint.
    pub fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let _: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            Ok(())
        })
    }
}

fn init(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(schema::CREATE_TABLES)
        .map_err(|e| StoreError::Database(format!("schema: {e}")))?;

    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .ok();
    if version.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [schema::SCHEMA_VERSION],
        )
        .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;
    }
    Ok(())
}
