//! Schema migrator (§4.C)
//!
//! Each entry carries `up`, `down`, and a `destructive` flag: migrations
//! must be reversible and self-describe risk. Pending migrations run in a
//! transaction each; a destructive migration triggers a physical backup
//! first.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::Connection;

/// One forward/backward schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
    pub down: &'static str,
    pub destructive: bool,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial schema: memories, documents, chunks, embedding cache",
        up: MIGRATION_V1_UP,
        down: MIGRATION_V1_DOWN,
        destructive: false,
    },
    Migration {
        version: 2,
        description: "memory relations and their review queue",
        up: MIGRATION_V2_UP,
        down: MIGRATION_V2_DOWN,
        destructive: false,
    },
    Migration {
        version: 3,
        description: "code graph: nodes, edges, cross-layer relations and suggestions",
        up: MIGRATION_V3_UP,
        down: MIGRATION_V3_DOWN,
        destructive: false,
    },
    Migration {
        version: 4,
        description: "GraphRAG entities, relationships, communities, reports",
        up: MIGRATION_V4_UP,
        down: MIGRATION_V4_DOWN,
        destructive: false,
    },
    Migration {
        version: 5,
        description: "vector store tables (points + payloads)",
        up: MIGRATION_V5_UP,
        down: MIGRATION_V5_DOWN,
        destructive: false,
    },
];

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("migration {version} failed: {cause}")]
    Failed {
        version: u32,
        cause: String,
        backup_path: Option<String>,
    },
}

pub type Result<T> = std::result::Result<T, MigrationError>;

/// Outcome of [`run`] / [`rollback`].
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub success: bool,
    pub applied: Vec<u32>,
    pub failed: Option<u32>,
    pub error: Option<String>,
    pub backup_path: Option<String>,
}

fn ensure_meta_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _doclea_meta (
            schema_version INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS _doclea_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
         );",
    )?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM _doclea_meta", [], |r| r.get(0))?;
    if count == 0 {
        conn.execute("INSERT INTO _doclea_meta (schema_version) VALUES (0)", [])?;
    }
    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    ensure_meta_tables(conn)?;
    let version: i64 = conn.query_row("SELECT schema_version FROM _doclea_meta LIMIT 1", [], |r| r.get(0))?;
    Ok(version as u32)
}

fn applied_versions(conn: &Connection) -> Result<Vec<u32>> {
    let mut stmt = conn.prepare("SELECT version FROM _doclea_migrations ORDER BY version")?;
    let rows = stmt.query_map([], |r| r.get::<_, i64>(0))?;
    Ok(rows
        .filter_map(|r| r.ok())
        .map(|v| v as u32)
        .collect())
}

fn pending(conn: &Connection, target_version: Option<u32>) -> Result<Vec<Migration>> {
    let applied = applied_versions(conn)?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .filter(|m| target_version.map(|t| m.version <= t).unwrap_or(true))
        .copied()
        .collect())
}

fn backup_database(db_path: &Path, from_version: u32) -> Result<PathBuf> {
    let backups_dir = db_path
        .parent()
        .map(|p| p.join("backups"))
        .unwrap_or_else(|| PathBuf::from("backups"));
    std::fs::create_dir_all(&backups_dir)?;
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let backup_path = backups_dir.join(format!("backup-{stamp}-{from_version}.db"));
    std::fs::copy(db_path, &backup_path)?;
    // WAL journal, if present, travels with the data file.
    let wal_src = db_path.with_extension("db-wal");
    if wal_src.exists() {
        let wal_dst = backup_path.with_extension("db-wal");
        std::fs::copy(&wal_src, &wal_dst)?;
    }
    Ok(backup_path)
}

/// Runs every pending migration (`dry_run=true` only reports what would
/// run). `db_path` is used solely to physically back up the file before a
/// destructive migration — pass `None` for in-memory databases, where no
/// backup is possible or needed.
pub fn run(conn: &mut Connection, db_path: Option<&Path>, target_version: Option<u32>, dry_run: bool) -> MigrationReport {
    let steps = match pending(conn, target_version) {
        Ok(s) => s,
        Err(e) => {
            return MigrationReport {
                success: false,
                applied: vec![],
                failed: None,
                error: Some(e.to_string()),
                backup_path: None,
            }
        }
    };

    if dry_run {
        return MigrationReport {
            success: true,
            applied: steps.iter().map(|m| m.version).collect(),
            failed: None,
            error: None,
            backup_path: None,
        };
    }

    let needs_backup = steps.iter().any(|m| m.destructive);
    let backup_path = if needs_backup {
        match db_path {
            Some(path) => match current_version(conn).and_then(|v| backup_database(path, v).map_err(Into::into)) {
                Ok(p) => Some(p.to_string_lossy().to_string()),
                Err(e) => {
                    return MigrationReport {
                        success: false,
                        applied: vec![],
                        failed: None,
                        error: Some(e.to_string()),
                        backup_path: None,
                    }
                }
            },
            None => None,
        }
    } else {
        None
    };

    let mut applied = Vec::new();
    for migration in &steps {
        let tx = match conn.transaction() {
            Ok(tx) => tx,
            Err(e) => {
                return MigrationReport {
                    success: false,
                    applied,
                    failed: Some(migration.version),
                    error: Some(e.to_string()),
                    backup_path,
                }
            }
        };

        let result = tx
            .execute_batch(migration.up)
            .and_then(|_| {
                tx.execute(
                    "INSERT INTO _doclea_migrations (version, applied_at) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, Utc::now().to_rfc3339()],
                )
            })
            .and_then(|_| {
                tx.execute(
                    "UPDATE _doclea_meta SET schema_version = ?1",
                    rusqlite::params![migration.version],
                )
            });

        match result {
            Ok(_) => {
                if let Err(e) = tx.commit() {
                    return MigrationReport {
                        success: false,
                        applied,
                        failed: Some(migration.version),
                        error: Some(e.to_string()),
                        backup_path,
                    };
                }
                applied.push(migration.version);
            }
            Err(e) => {
                return MigrationReport {
                    success: false,
                    applied,
                    failed: Some(migration.version),
                    error: Some(e.to_string()),
                    backup_path,
                };
            }
        }
    }

    MigrationReport {
        success: true,
        applied,
        failed: None,
        error: None,
        backup_path,
    }
}

/// Rolls back to `target_version` by running `down` in reverse order.
pub fn rollback(conn: &mut Connection, target_version: u32) -> MigrationReport {
    let applied = match applied_versions(conn) {
        Ok(v) => v,
        Err(e) => {
            return MigrationReport {
                success: false,
                applied: vec![],
                failed: None,
                error: Some(e.to_string()),
                backup_path: None,
            }
        }
    };

    let mut to_revert: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| applied.contains(&m.version) && m.version > target_version)
        .collect();
    to_revert.sort_by(|a, b| b.version.cmp(&a.version));

    let mut reverted = Vec::new();
    for migration in to_revert {
        let tx = match conn.transaction() {
            Ok(tx) => tx,
            Err(e) => {
                return MigrationReport {
                    success: false,
                    applied: reverted,
                    failed: Some(migration.version),
                    error: Some(e.to_string()),
                    backup_path: None,
                }
            }
        };

        let result = tx
            .execute_batch(migration.down)
            .and_then(|_| tx.execute("DELETE FROM _doclea_migrations WHERE version = ?1", rusqlite::params![migration.version]))
            .and_then(|_| {
                tx.execute(
                    "UPDATE _doclea_meta SET schema_version = ?1",
                    rusqlite::params![target_version],
                )
            });

        match result {
            Ok(_) => {
                if let Err(e) = tx.commit() {
                    return MigrationReport {
                        success: false,
                        applied: reverted,
                        failed: Some(migration.version),
                        error: Some(e.to_string()),
                        backup_path: None,
                    };
                }
                reverted.push(migration.version);
            }
            Err(e) => {
                return MigrationReport {
                    success: false,
                    applied: reverted,
                    failed: Some(migration.version),
                    error: Some(e.to_string()),
                    backup_path: None,
                };
            }
        }
    }

    MigrationReport {
        success: true,
        applied: reverted,
        failed: None,
        error: None,
        backup_path: None,
    }
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE memories (
    id TEXT PRIMARY KEY,
    memory_type TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT,
    importance REAL NOT NULL DEFAULT 0.5,
    tags TEXT NOT NULL DEFAULT '[]',
    related_files TEXT NOT NULL DEFAULT '[]',
    git_commit TEXT,
    source_pr TEXT,
    experts TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    accessed_at INTEGER NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    needs_review INTEGER NOT NULL DEFAULT 0,
    vector_id TEXT,
    decay_rate REAL,
    last_refreshed_at INTEGER,
    confidence_floor REAL,
    decay_function TEXT
);
CREATE INDEX idx_memories_type ON memories(memory_type);
CREATE INDEX idx_memories_accessed_at ON memories(accessed_at);
CREATE VIRTUAL TABLE memories_fts USING fts5(id UNINDEXED, title, content, tags, content=memories, content_rowid=rowid);

CREATE TRIGGER memories_fts_insert AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, id, title, content, tags) VALUES (new.rowid, new.id, new.title, new.content, new.tags);
END;
CREATE TRIGGER memories_fts_update AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, title, content, tags) VALUES ('delete', old.rowid, old.id, old.title, old.content, old.tags);
    INSERT INTO memories_fts(rowid, id, title, content, tags) VALUES (new.rowid, new.id, new.title, new.content, new.tags);
END;
CREATE TRIGGER memories_fts_delete AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, title, content, tags) VALUES ('delete', old.rowid, old.id, old.title, old.content, old.tags);
END;

CREATE TABLE documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    vector_id TEXT,
    start_offset INTEGER NOT NULL,
    end_offset INTEGER NOT NULL,
    headers TEXT NOT NULL DEFAULT '[]',
    level INTEGER NOT NULL DEFAULT 0,
    start_line INTEGER NOT NULL DEFAULT 0,
    end_line INTEGER NOT NULL DEFAULT 0,
    has_frontmatter INTEGER NOT NULL DEFAULT 0,
    has_code_block INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX idx_chunks_document_id ON chunks(document_id);

CREATE TABLE embedding_cache (
    content_hash TEXT NOT NULL,
    model TEXT NOT NULL,
    vector BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (content_hash, model)
);
"#;

const MIGRATION_V1_DOWN: &str = r#"
DROP TABLE IF EXISTS embedding_cache;
DROP TABLE IF EXISTS chunks;
DROP TABLE IF EXISTS documents;
DROP TABLE IF EXISTS memories_fts;
DROP TABLE IF EXISTS memories;
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE memory_relations (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    metadata TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE(source_id, target_id, relation_type)
);
CREATE INDEX idx_memory_relations_source ON memory_relations(source_id);
CREATE INDEX idx_memory_relations_target ON memory_relations(target_id);

CREATE TABLE relation_suggestions (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    suggested_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    reason TEXT NOT NULL,
    detection_method TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL,
    reviewed_at INTEGER
);
CREATE INDEX idx_relation_suggestions_status ON relation_suggestions(status);
"#;

const MIGRATION_V2_DOWN: &str = r#"
DROP TABLE IF EXISTS relation_suggestions;
DROP TABLE IF EXISTS memory_relations;
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE TABLE code_nodes (
    id TEXT PRIMARY KEY,
    node_type TEXT NOT NULL,
    name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    start_line INTEGER,
    end_line INTEGER,
    signature TEXT,
    summary TEXT,
    metadata TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX idx_code_nodes_file_path ON code_nodes(file_path);

CREATE TABLE code_edges (
    id TEXT PRIMARY KEY,
    from_node TEXT NOT NULL REFERENCES code_nodes(id) ON DELETE CASCADE,
    to_node TEXT NOT NULL REFERENCES code_nodes(id) ON DELETE CASCADE,
    edge_type TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);
CREATE INDEX idx_code_edges_from ON code_edges(from_node);
CREATE INDEX idx_code_edges_to ON code_edges(to_node);

CREATE TABLE cross_layer_relations (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    code_node_id TEXT NOT NULL REFERENCES code_nodes(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    direction TEXT NOT NULL,
    confidence REAL NOT NULL,
    metadata TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE(memory_id, code_node_id, relation_type)
);

CREATE TABLE cross_layer_suggestions (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL,
    code_node_id TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    direction TEXT NOT NULL,
    confidence REAL NOT NULL,
    reason TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL,
    reviewed_at INTEGER
);
CREATE INDEX idx_cross_layer_suggestions_status ON cross_layer_suggestions(status);
"#;

const MIGRATION_V3_DOWN: &str = r#"
DROP TABLE IF EXISTS cross_layer_suggestions;
DROP TABLE IF EXISTS cross_layer_relations;
DROP TABLE IF EXISTS code_edges;
DROP TABLE IF EXISTS code_nodes;
"#;

const MIGRATION_V4_UP: &str = r#"
CREATE TABLE graph_entities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    description TEXT,
    vector_id TEXT
);

CREATE TABLE graph_relationships (
    id TEXT PRIMARY KEY,
    source_entity_id TEXT NOT NULL REFERENCES graph_entities(id) ON DELETE CASCADE,
    target_entity_id TEXT NOT NULL REFERENCES graph_entities(id) ON DELETE CASCADE,
    relationship_type TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 1.0
);

CREATE TABLE graph_communities (
    id TEXT PRIMARY KEY,
    level INTEGER NOT NULL,
    entity_ids TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE graph_reports (
    id TEXT PRIMARY KEY,
    community_id TEXT NOT NULL REFERENCES graph_communities(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    full_content TEXT NOT NULL,
    vector_id TEXT
);
"#;

const MIGRATION_V4_DOWN: &str = r#"
DROP TABLE IF EXISTS graph_reports;
DROP TABLE IF EXISTS graph_communities;
DROP TABLE IF EXISTS graph_relationships;
DROP TABLE IF EXISTS graph_entities;
"#;

const MIGRATION_V5_UP: &str = r#"
CREATE TABLE vector_points (
    id TEXT PRIMARY KEY,
    embedding BLOB NOT NULL
);
CREATE TABLE vector_payloads (
    id TEXT PRIMARY KEY REFERENCES vector_points(id) ON DELETE CASCADE,
    memory_id TEXT,
    kind TEXT,
    type TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    related_files TEXT NOT NULL DEFAULT '[]',
    importance REAL NOT NULL DEFAULT 0.0
);
CREATE INDEX idx_vector_payloads_memory_id ON vector_payloads(memory_id);
"#;

const MIGRATION_V5_DOWN: &str = r#"
DROP TABLE IF EXISTS vector_payloads;
DROP TABLE IF EXISTS vector_points;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_applies_every_pending_migration_in_order() {
        let mut conn = Connection::open_in_memory().unwrap();
        let report = run(&mut conn, None, None, false);
        assert!(report.success);
        assert_eq!(report.applied, vec![1, 2, 3, 4, 5]);
        assert_eq!(current_version(&conn).unwrap(), 5);
    }

    #[test]
    fn dry_run_reports_without_applying() {
        let mut conn = Connection::open_in_memory().unwrap();
        let report = run(&mut conn, None, None, true);
        assert!(report.success);
        assert_eq!(current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn run_respects_target_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        let report = run(&mut conn, None, Some(2), false);
        assert!(report.success);
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn rollback_runs_down_in_reverse_order() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn, None, None, false);
        let report = rollback(&mut conn, 1);
        assert!(report.success);
        assert_eq!(report.applied, vec![5, 4, 3, 2]);
        assert_eq!(current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn running_twice_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn, None, None, false);
        let second = run(&mut conn, None, None, false);
        assert!(second.success);
        assert!(second.applied.is_empty());
    }
}
