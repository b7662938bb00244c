// Storage layer — the byte-oriented KV store every site's state lives in.
//
// The SQLite backend uses rusqlite with the "bundled" feature so there's no
// system SQLite dependency. The database file lives wherever
// WATCHPOST_DB_PATH points (defaults to ./watchpost.db).

pub mod memory;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod queries;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryKvStore;
pub use traits::KvStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKvStore;

#[cfg(feature = "sqlite")]
use anyhow::{Context, Result};
#[cfg(feature = "sqlite")]
use rusqlite::Connection;
#[cfg(feature = "sqlite")]
use std::path::Path;
#[cfg(feature = "sqlite")]
use std::sync::Arc;

/// Open (or create) the database and run migrations.
///
/// This is the main entry point, called by `watchpost init` and by any
/// command that needs database access.
#[cfg(feature = "sqlite")]
pub fn initialize(db_path: &str) -> Result<Connection> {
    // Create parent directories if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // Enable WAL mode so pollers and the dispatcher don't block each other's reads
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Open an existing database (fails if it doesn't exist yet).
#[cfg(feature = "sqlite")]
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `watchpost init` first.",
            db_path
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;

    Ok(conn)
}

/// Open an existing SQLite database as a shareable KvStore.
#[cfg(feature = "sqlite")]
pub fn open_sqlite(db_path: &str) -> Result<Arc<dyn KvStore>> {
    let conn = open(db_path)?;
    Ok(Arc::new(SqliteKvStore::new(conn)))
}

/// Create (or migrate) the SQLite database and wrap it.
#[cfg(feature = "sqlite")]
pub fn initialize_sqlite(db_path: &str) -> Result<SqliteKvStore> {
    let conn = initialize(db_path)?;
    Ok(SqliteKvStore::new(conn))
}
