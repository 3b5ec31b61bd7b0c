//! Document store behind the crawl pipeline
//!
//! Three logical collections (modules, downloads, dependents) hold one
//! JSON document per package name with replace-or-insert semantics. The
//! SQLite backend keeps one table per collection; schema files live under
//! `sql/` and are idempotent.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Database(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Logical collections written by the crawl pipeline and read by the
/// reporting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Modules,
    Downloads,
    Dependents,
}

impl Collection {
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Modules => "modules",
            Collection::Downloads => "downloads",
            Collection::Dependents => "dependents",
        }
    }
}

/// Key-addressed document store with upsert semantics
///
/// Upserts replace the whole document for a key; there is no
/// partial-field update. Implementations must be safe to share across
/// the sequential traversal (`Send + Sync`).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Replace-or-insert the document for `key` in `collection`.
    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        doc: &Value,
    ) -> Result<(), StoreError>;

    /// Read back the document for `key`, if present. Used by tests and
    /// the reporting layer; the crawl itself never reads its own writes.
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError>;
}

/// Run schema migrations from SQL files
///
/// Reads all .sql files from the specified directory in filename order
/// and executes them. Every file must use "IF NOT EXISTS" clauses so the
/// loader stays idempotent across restarts.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<(), StoreError> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(StoreError::Database(format!(
            "Schema directory not found: {}",
            schema_dir
        )));
    }

    // WAL mode lets the reporting layer read while a crawl writes
    conn.pragma_update(None, "journal_mode", "WAL")?;

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🗄️  Preparing collections in {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = path.file_name().unwrap_or_default().to_string_lossy();

        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;

        log::info!("   └─ {} applied", filename);
    }

    Ok(())
}

/// SQLite implementation of [`DocumentStore`]
///
/// One connection shared behind a mutex; documents are stored as JSON
/// text keyed by package name.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and apply schema
    /// migrations from `schema_dir`.
    pub fn open(db_path: &str, schema_dir: &str) -> Result<Self, StoreError> {
        let mut conn = Connection::open(db_path)?;
        run_schema_migrations(&mut conn, schema_dir)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database, for tests.
    pub fn open_in_memory(schema_dir: &str) -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        run_schema_migrations(&mut conn, schema_dir)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        doc: &Value,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(doc)?;
        let now = chrono::Utc::now().timestamp();

        let sql = format!(
            "INSERT INTO {} (name, doc, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                doc = excluded.doc,
                updated_at = excluded.updated_at",
            collection.table_name()
        );

        let conn = self.lock_conn()?;
        conn.execute(&sql, rusqlite::params![key, json, now])?;

        Ok(())
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        let sql = format!(
            "SELECT doc FROM {} WHERE name = ?1",
            collection.table_name()
        );

        let conn = self.lock_conn()?;
        let json: Option<String> = conn
            .query_row(&sql, rusqlite::params![key], |row| row.get(0))
            .optional()?;

        match json {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }
}
