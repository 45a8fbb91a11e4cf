//! Relational store + migrator (§4.C)
//!
//! `rusqlite` with a single `Mutex<Connection>` writer, WAL mode,
//! `busy_timeout`, foreign keys on. Every table from §3's data model lives
//! here, plus `_doclea_meta` and `_doclea_migrations` which [`migrations`]
//! manages.

mod codegraph;
mod documents;
mod graphrag;
mod memories;
mod relations;

pub mod migrations;

pub use migrations::{Migration, MigrationError, MigrationReport, MIGRATIONS};

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use rusqlite::Connection;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("initialization error: {0}")]
    Init(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// The relational store. Methods take `&self`: interior mutability through
/// `Mutex<Connection>` keeps `Storage` `Send + Sync` so callers share it as
/// `Arc<Storage>` (teacher's convention, avoiding `Arc<Mutex<Storage>>`).
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(())
    }

    /// Opens (creating if absent) the store at `db_path`, or the default
    /// platform data directory when `None`, and applies every pending
    /// migration.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("ai", "doclea", "doclea")
                    .ok_or_else(|| StorageError::Init("could not determine project directories".into()))?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = std::fs::set_permissions(data_dir, std::fs::Permissions::from_mode(0o700));
                }
                data_dir.join("doclea.db")
            }
        };
        Self::open_at(&path)
    }

    fn open_at(path: &Path) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;
        let report = migrations::run(&mut conn, Some(path), None, false);
        if !report.success {
            return Err(StorageError::Init(
                report.error.unwrap_or_else(|| "migration failed".into()),
            ));
        }
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store for tests: migrations run with no backup path.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        let report = migrations::run(&mut conn, None, None, false);
        if !report.success {
            return Err(StorageError::Init(
                report.error.unwrap_or_else(|| "migration failed".into()),
            ));
        }
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        Ok(migrations::current_version(&conn)?)
    }

    pub fn migrate(&self, target_version: Option<u32>, dry_run: bool) -> MigrationReport {
        let mut conn = self.conn.lock().unwrap();
        migrations::run(&mut conn, None, target_version, dry_run)
    }

    pub fn rollback_to(&self, target_version: u32) -> MigrationReport {
        let mut conn = self.conn.lock().unwrap();
        migrations::rollback(&mut conn, target_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_runs_every_migration() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.schema_version().unwrap(), 5);
    }
}
